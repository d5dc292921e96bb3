pub mod notification;
pub mod user;

pub use notification::{Notification, NotificationResponse};
pub use user::User;

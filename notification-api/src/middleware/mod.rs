pub mod user_id;

pub use user_id::{AuthenticatedUser, USER_ID_HEADER};

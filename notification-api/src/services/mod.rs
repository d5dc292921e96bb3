pub mod metrics;
pub mod notifications;
pub mod users;

pub use metrics::{get_metrics, init_metrics, record_notification_acknowledged, record_notifications_listed};
pub use notifications::{InMemoryNotificationStore, MongoNotificationStore, NotificationStore};
pub use users::{InMemoryUserStore, PgUserStore, UserStore};

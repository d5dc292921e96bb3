pub mod error_reporting;
pub mod logging;

pub use error_reporting::{
    init_sentry, ErrorEvent, ErrorReporter, LogReporter, RecordingReporter, SentryReporter,
};
pub use logging::init_tracing;

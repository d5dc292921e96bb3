pub mod cors;
pub mod error_boundary;
pub mod metrics;
pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

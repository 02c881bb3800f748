pub mod metrics;
pub mod tracing;

pub use metrics::Sink;
pub use tracing::{init_tracing, shutdown_tracing};

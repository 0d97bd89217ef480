pub mod metrics;
pub mod pool;
pub mod timeout;

pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use pool::{TaskEngine, TaskResult, TaskSpec};
pub use timeout::{AdaptiveTimeout, progressive_timeout};

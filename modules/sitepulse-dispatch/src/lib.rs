pub mod api;
pub mod breaker;
pub mod dispatcher;
pub mod retry;
pub mod serial;
pub mod submit;

pub use api::{HttpMetricsApi, KeywordMetric, MetricsApi, MetricsResponse};
pub use breaker::CircuitBreaker;
pub use dispatcher::{DispatchOutcome, KeywordDispatcher};
pub use retry::RetryQueue;
pub use serial::SerialExecutor;
pub use submit::{BackendSubmitter, SubmitReport};

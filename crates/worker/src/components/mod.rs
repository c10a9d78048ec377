pub mod liveness_reporter;
pub mod worker_lifecycle;

pub use liveness_reporter::LivenessReporter;
pub use worker_lifecycle::WorkerLifecycle;

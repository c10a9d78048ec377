pub mod app_config;
pub mod logging;
pub mod queue;
pub mod services;

pub use app_config::*;
pub use logging::*;
pub use queue::*;
pub use services::*;

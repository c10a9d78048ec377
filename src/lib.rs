pub mod app;
pub mod shutdown;

pub use app::Application;
pub use shutdown::{run_until_shutdown, ShutdownManager};

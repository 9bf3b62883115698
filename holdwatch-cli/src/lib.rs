pub mod app;
pub mod pipeline;
pub mod reconcile;
pub mod serve;
pub mod telemetry;

pub use app::run as run_app;

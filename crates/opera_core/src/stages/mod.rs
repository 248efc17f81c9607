//! The stages of a standard run, in execution order.

pub mod app_server;
pub mod build;
pub mod initialize;
pub mod mock_server;
pub mod report;
pub mod wait;

pub use app_server::AppServerStage;
pub use build::BuildStage;
pub use initialize::InitializeStage;
pub use load_test::{LoadTestStage, LoadTestTask};
pub use mock_server::MockServerStage;
pub use report::ReportStage;
pub use wait::WaitStage;

//! # opera_runner
//!
//! Container runtime client and run primitives for operaio.
//!
//! # Features
//!
//! - **Runtime Client**: [`ContainerRuntime`] trait, backed by the Docker API (bollard)
//!   over a local socket or a remote TLS endpoint
//! - **Run-attached**: create, forward output, start, wait for exit, inspect
//! - **Run-detached**: create, start, inspect, return immediately
//! - **Handles**: in-memory records of created or adopted containers
//! - **Mock Runtime**: for testing without actual containers
//!
//! # Example
//!
//! ```rust,no_run
//! use opera_runner::{run_attached, stdout_sink, ContainerConfig, DockerRuntime, Endpoint};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = DockerRuntime::connect(&Endpoint::from_env())?;
//!
//!     let config = ContainerConfig::new("electrode-app-builder")
//!         .env("APP_BUILD_CMD", "npm run build")
//!         .attached();
//!
//!     let handle = run_attached(&runtime, &config, stdout_sink()).await?;
//!     println!("Built in container {}", handle.short_id());
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod docker;
pub mod error;
pub mod forward;
pub mod handle;
pub mod mock;
pub mod run;
pub mod runtime;

pub use config::{ContainerConfig, StreamMode};
pub use docker::{DockerRuntime, Endpoint};
pub use error::{RunnerError, RunnerResult};
pub use forward::{stdout_sink, LogForwarder, LogSink};
pub use handle::{ContainerHandle, InspectData, PortBinding};
pub use mock::{CapturedCall, MockRuntime};
pub use run::{run_attached, run_detached, RunFailure, RunOutcome};
pub use runtime::{ContainerRuntime, OutputStream, RemoveOptions};

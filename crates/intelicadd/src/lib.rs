//! InteliCAD job daemon library.
//!
//! Exposes the job service, planning pipeline and HTTP router so the
//! executor's integration tests can run a daemon in-process.

pub mod artifacts;
pub mod config;
pub mod jobs;
pub mod pipeline;
pub mod prompts;
pub mod routes;
pub mod safety;
pub mod server;
pub mod store;

pub use config::Config;
pub use jobs::{JobService, Upload};
pub use server::AppState;

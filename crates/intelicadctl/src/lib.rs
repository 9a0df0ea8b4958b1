//! InteliCAD executor library.
//!
//! The poll loop, backend client, operation executor and simulated CAD
//! session behind the `intelicadctl` binary.

pub mod cad;
pub mod client;
pub mod commands;
pub mod config;
pub mod executor;
pub mod poll_loop;

pub use cad::{CadError, CadSession, SimulatedSession};
pub use client::{BackendClient, ClientError, JobBackend};
pub use config::ExecutorConfig;
pub use executor::OperationExecutor;
pub use poll_loop::{ExecutorHandle, PollLoop, SessionOpener, SimulatedOpener};

//! SchemaFlow CLI support
//!
//! - [`simulator`]: run a saved workflow against an in-memory store
//! - [`inspect`]: validate and list a saved workflow
//! - [`input`]: snapshot and config loading
//! - [`logging`]: subscriber setup

#![allow(missing_docs)]

pub mod input;
pub mod inspect;
pub mod logging;
pub mod simulator;

pub use input::{load_config, read_snapshot};
pub use inspect::{inspect, InspectReport};
pub use logging::init_tracing;
pub use simulator::{run_simulator, NodeReadiness, SimulatorConfig, SimulatorReport};

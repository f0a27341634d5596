//! Carnet CLI - query and control a vehicle from the command line.
//!
//! - `cli` - argument parsing
//! - `config` - the account configuration blob
//! - `paths` - state directory resolution
//! - `state` - the per-VIN state cache
//! - `car` - the command executor

pub mod car;
pub mod cli;
pub mod command;
pub mod config;
pub mod paths;
pub mod state;

pub use car::Car;
pub use cli::{Cli, LogLevel};
pub use command::{Command, CommandValue};
pub use config::Config;
pub use state::{CarState, CarStates};

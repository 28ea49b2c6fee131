//! Child process supervision.
//!
//! This module runs a wrapped command with its output captured to a session
//! log and mirrored to the console, and handles operator interruption.

mod command;
mod pump;
mod signal;
mod supervisor;

pub use command::{join_command, round_trips, tokenize};
pub use signal::Interrupt;
pub use supervisor::{
    RunOutcome, RunReport, RunRequest, Supervisor, SupervisorError, INTERRUPTED_EXIT_CODE,
};

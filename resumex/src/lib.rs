//! Resumex - a resumable command wrapper.
//!
//! Runs any command as a tracked session so it can be resumed after an
//! interruption.
//!
//! Architecture:
//! - Sessions are JSON records under ~/.resumex/sessions, logs under ~/.resumex/logs
//! - The supervisor pumps child output into the log and handles SIGINT/SIGTERM
//! - Resume rules rewrite known tools' command lines to continue earlier work

pub mod cli;
pub mod config;
pub mod models;
pub mod process;
pub mod resume;
pub mod store;

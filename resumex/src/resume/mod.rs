//! Resume heuristics.
//!
//! Maps a tool name to a rule that rewrites a stored command line so the tool
//! continues earlier work instead of starting over.

mod registry;
mod rules;

pub use registry::{base_tool_name, ResumeRegistry, ResumeRule};

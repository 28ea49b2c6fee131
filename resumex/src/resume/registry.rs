//! Registry of tool name to resume rule bindings.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use super::rules;
use crate::models::SessionRecord;
use crate::process::tokenize;

/// Rewrites a command line so the tool picks up where it stopped.
pub trait ResumeRule: Send + Sync {
    /// Return the command line to run when resuming.
    fn rewrite(&self, command_line: &str) -> String;
}

impl<F> ResumeRule for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn rewrite(&self, command_line: &str) -> String {
        self(command_line)
    }
}

/// Known tools and how to resume them.
///
/// Built once at startup and passed by reference; tests build their own.
#[derive(Default)]
pub struct ResumeRegistry {
    rules: HashMap<String, Box<dyn ResumeRule>>,
}

impl ResumeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry preloaded with rules for `wget`, `curl`, `rsync` and `tar`.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("wget", rules::wget);
        registry.register("curl", rules::curl);
        registry.register("rsync", rules::rsync);
        registry.register("tar", rules::tar);
        registry
    }

    /// Bind a rule to a tool name, replacing any earlier binding.
    pub fn register(&mut self, tool: impl Into<String>, rule: impl ResumeRule + 'static) {
        self.rules.insert(tool.into(), Box::new(rule));
    }

    /// Registered tool names, sorted.
    pub fn tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        tools.sort_unstable();
        tools
    }

    /// Compute the command line to run when resuming `record`.
    ///
    /// Unknown tools get their original command line back.
    pub fn resume_command(&self, record: &SessionRecord) -> String {
        self.rewrite(&record.command_line)
    }

    /// Apply the matching rule to a raw command line.
    pub fn rewrite(&self, command_line: &str) -> String {
        let tokens = tokenize(command_line);
        let Some(executable) = tokens.first() else {
            return command_line.to_string();
        };

        let tool = base_tool_name(executable);
        match self.rules.get(tool) {
            Some(rule) => {
                let rewritten = rule.rewrite(command_line);
                debug!(tool, %rewritten, "applied resume rule");
                rewritten
            }
            None => command_line.to_string(),
        }
    }
}

impl fmt::Debug for ResumeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeRegistry")
            .field("tools", &self.tools())
            .finish()
    }
}

/// Final path segment of an executable, e.g. `/usr/bin/wget` -> `wget`.
pub fn base_tool_name(executable: &str) -> &str {
    executable
        .rsplit_once('/')
        .map_or(executable, |(_, name)| name)
}

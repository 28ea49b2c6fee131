//! Built-in rewrite rules for well-known transfer and archive tools.
//!
//! Checks are plain substring matches on the raw command line, so a file name
//! that happens to contain a flag spelling counts as the flag being present.

/// `wget`: continue a partially downloaded file.
pub fn wget(command_line: &str) -> String {
    if command_line.contains("-c") || command_line.contains("--continue") {
        return command_line.to_string();
    }
    format!("{command_line} -c")
}

/// `curl`: let curl work out where to continue from.
pub fn curl(command_line: &str) -> String {
    if command_line.contains("-C") || command_line.contains("--continue-at") {
        return command_line.to_string();
    }
    format!("{command_line} -C -")
}

/// `rsync`: keep partially transferred files.
pub fn rsync(command_line: &str) -> String {
    if command_line.contains("--partial") {
        return command_line.to_string();
    }
    format!("{command_line} --partial")
}

/// `tar`: on extraction, skip files already extracted.
///
/// Archive creation is re-run unchanged.
pub fn tar(command_line: &str) -> String {
    if command_line.contains("-x") && !command_line.contains("--keep-newer-files") {
        return format!("{command_line} --keep-newer-files");
    }
    command_line.to_string()
}

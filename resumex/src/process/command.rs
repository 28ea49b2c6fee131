//! Command-line splitting and joining.
//!
//! The tokenizer is deliberately simple: any `"` or `'` toggles quoting, so
//! open and close characters do not have to match. Quote characters are never
//! literal and empty tokens are dropped, so arguments that are empty or
//! contain a quote cannot be stored; [`round_trips`] detects them.

/// Split a command line into executable and arguments.
///
/// Unquoted spaces separate tokens and runs of spaces never produce empty
/// tokens. An empty result means there is no command to run.
pub fn tokenize(command_line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in command_line.chars() {
        match ch {
            '"' | '\'' => in_quotes = !in_quotes,
            ' ' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

/// Join argv into the command line stored for a session.
///
/// Arguments containing spaces are quoted so [`tokenize`] splits the result
/// back into the same arguments.
pub fn join_command<S: AsRef<str>>(args: &[S]) -> String {
    args.iter()
        .map(|arg| quote_arg(arg.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Whether [`tokenize`] gives back exactly `args` from [`join_command`].
pub fn round_trips<S: AsRef<str>>(args: &[S]) -> bool {
    tokenize(&join_command(args))
        .iter()
        .map(String::as_str)
        .eq(args.iter().map(AsRef::as_ref))
}

fn quote_arg(arg: &str) -> String {
    if !arg.contains(' ') {
        return arg.to_string();
    }

    if arg.contains('"') {
        format!("'{arg}'")
    } else {
        format!("\"{arg}\"")
    }
}

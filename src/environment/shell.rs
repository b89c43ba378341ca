//! Shell command composition
//!
//! Joins several shell instructions into a single `sh -c` invocation so that a
//! group of setup commands runs as one step. Instructions keep their order and
//! are chained with `&&`, so the first nonzero exit stops the rest.

const SHELL: &str = "sh";
const TRACE_PREFIX: &str = "set -o xtrace";

/// Build the argv for running `instructions` as one fail-fast shell step.
///
/// `set -o xtrace` is prepended so the captured stderr shows which
/// instruction was running when the step failed.
pub fn sh_dash_c<I, S>(instructions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let script = std::iter::once(TRACE_PREFIX.to_string())
        .chain(
            instructions
                .into_iter()
                .map(|s| s.as_ref().trim().to_string())
                .filter(|s| !s.is_empty()),
        )
        .collect::<Vec<_>>()
        .join(" && ");

    vec![SHELL.to_string(), "-c".to_string(), script]
}

/// Render an argv as a single human-readable command line.
pub fn display_command(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) || arg.contains('"') {
                format!("\"{}\"", arg.replace('"', "\\\""))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

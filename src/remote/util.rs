//! Utility functions for path manipulation and captured output.

/// Maximum number of stderr lines carried in error values.
const STDERR_TAIL_LINES: usize = 20;

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If the `HOME` environment variable is not set, the input is returned
/// unchanged.
///
/// # Examples
///
/// ```
/// # use cloudtrain::remote::expand_tilde;
/// let home = std::env::var("HOME").expect("HOME should be set");
/// assert_eq!(expand_tilde("~/.ssh/id_rsa"), format!("{home}/.ssh/id_rsa"));
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Keeps the last lines of captured stderr; pip and spaCy failures put the
/// useful part at the end of very long output.
pub(crate) fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim_end().lines().collect();
    let skip = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines.iter().skip(skip).copied().collect::<Vec<_>>().join("\n")
}

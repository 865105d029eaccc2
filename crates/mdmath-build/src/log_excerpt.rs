//! Pulls a short diagnosis out of TeX engine output.
//!
//! TeX reports errors as a line starting with `!`, followed a few lines later
//! by an `l.<line> <source>` reference. Only the first error is extracted;
//! everything after it is usually a consequence.

/// Number of trailing lines kept by [`tail`].
const TAIL_LINES: usize = 5;

/// Returns the first `! message` of a TeX log, with its `l.N` reference if
/// one follows before the next error.
pub fn first_error(log: &str) -> Option<String> {
    let mut lines = log.lines();
    let message = lines
        .by_ref()
        .find_map(|line| line.strip_prefix('!'))?
        .trim()
        .to_string();

    let line_ref = lines
        .take_while(|line| !line.starts_with('!'))
        .find(|line| is_line_ref(line));

    Some(match line_ref {
        Some(line_ref) => format!("{} ({})", message, line_ref.trim_end()),
        None => message,
    })
}

fn is_line_ref(line: &str) -> bool {
    line.strip_prefix("l.")
        .map(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
        .unwrap_or(false)
}

/// The last few non-empty lines of `output`, joined with newlines.
pub fn tail(output: &str) -> Option<String> {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(TAIL_LINES);
    Some(lines[start..].join("\n"))
}

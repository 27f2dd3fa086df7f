use super::SandboxError;

/// Tokens no fragment may contain, whatever language the agent thought it
/// was writing.
pub const DEFAULT_DENYLIST: &[&str] = &[
    "System.IO",
    "System.Net",
    "Process.",
    "DllImport",
    "Reflection",
    "std::fs",
    "std::net",
    "std::process",
    "unsafe",
    "extern",
];

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

/// Rejects the fragment at the first denied token, built-in or configured.
pub fn screen(source: &str, extra: &[String]) -> Result<(), SandboxError> {
    let tokens = DEFAULT_DENYLIST
        .iter()
        .copied()
        .chain(extra.iter().map(String::as_str))
        .filter(|token| !token.trim().is_empty());

    let earliest = tokens
        .filter_map(|token| source.find(token).map(|offset| (offset, token)))
        .min_by_key(|(offset, _)| *offset);

    match earliest {
        Some((offset, token)) => Err(SandboxError::Denied {
            token: token.to_string(),
            line: line_of(source, offset),
        }),
        None => Ok(()),
    }
}

//! Detection of conversational text where code was expected.

/// Lead-ins that mark explanatory prose rather than file content.
pub fn default_markers() -> Vec<String> {
    [
        "here's",
        "here is",
        "this is a",
        "sure,",
        "sure!",
        "certainly",
        "below is",
        "i've ",
        "i have created",
        "let me",
        "note:",
        "## ",
        "### ",
        "**",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Return the first of the leading `max_lines` non-blank lines that begins
/// with one of `markers` (case-insensitive).
pub fn find_conversational_line<'a>(
    content: &'a str,
    markers: &[String],
    max_lines: usize,
) -> Option<&'a str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(max_lines)
        .find(|line| {
            let lower = line.to_lowercase();
            markers
                .iter()
                .any(|m| !m.is_empty() && lower.starts_with(&m.to_lowercase()))
        })
}

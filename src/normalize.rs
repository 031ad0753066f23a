//! Repairs for the most common ways a model mangles file names and bodies.

/// Characters that may not end an artifact name.
pub const DELIMITER_CHARS: &[char] = &[':', '-', '.', '/', '\\'];

/// Fix common file name issues in generated output.
///
/// - `manifest` and `manifest.` become `manifest.json`
/// - a trailing `.` is repaired by guessing the extension from the stem
///
/// Anything else is returned trimmed but otherwise unchanged.
pub fn normalize_artifact_name(raw: &str) -> String {
    let name = raw.trim().trim_matches('`').trim();

    let lower = name.to_lowercase();
    if lower == "manifest" || lower == "manifest." {
        return "manifest.json".to_string();
    }

    if let Some(stem) = name.strip_suffix('.') {
        let base = stem.to_lowercase();
        let guessed = if base.contains("manifest") {
            Some("json")
        } else if base.contains("html") || base.contains("popup") || base.contains("options") {
            Some("html")
        } else if base.contains("css") || base.contains("style") {
            Some("css")
        } else if base.contains("js") || base.contains("script") {
            Some("js")
        } else {
            None
        };
        if let Some(ext) = guessed {
            return format!("{}.{}", stem, ext);
        }
    }

    name.to_string()
}

/// Whether a captured name is noise rather than a file name.
///
/// Empty names, single characters and names ending with a delimiter
/// character are noise.
pub fn is_noise_name(name: &str) -> bool {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (None, _) | (Some(_), None) => true,
        _ => name.ends_with(DELIMITER_CHARS),
    }
}

/// Remove a leading and/or trailing markdown code fence.
///
/// Models wrap files in ```` ```lang ```` blocks despite being told not to.
/// Only whole fence lines at the very start or end are removed; fences in
/// the middle of the content are kept.
pub fn strip_code_fences(content: &str) -> String {
    let trimmed = content.trim();
    let mut lines: Vec<&str> = trimmed.lines().collect();

    if lines.first().is_some_and(|l| is_fence_line(l)) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }

    if lines.len() == trimmed.lines().count() {
        return content.to_string();
    }
    lines.join("\n").trim().to_string()
}

fn is_fence_line(line: &str) -> bool {
    let line = line.trim();
    match line.strip_prefix("```") {
        Some(tag) => tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '+'),
        None => false,
    }
}

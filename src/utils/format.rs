//! Formatting utilities.

/// Format a byte count as a human-readable size.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.1} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.1} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} B", bytes)
    }
}

/// Truncate a filename for display, keeping the extension visible.
///
/// Works on characters rather than bytes so attachment names with
/// non-ASCII text never split inside a code point.
pub fn truncate_filename(name: &str, max_len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= max_len || max_len < 4 {
        return name.to_string();
    }

    if let Some(dot_pos) = chars.iter().rposition(|c| *c == '.') {
        let ext_len = chars.len() - dot_pos;
        if ext_len < max_len - 4 {
            let prefix_len = max_len - ext_len - 3;
            let prefix: String = chars[..prefix_len].iter().collect();
            let ext: String = chars[dot_pos..].iter().collect();
            return format!("{}...{}", prefix, ext);
        }
    }

    let prefix: String = chars[..max_len - 3].iter().collect();
    format!("{}...", prefix)
}

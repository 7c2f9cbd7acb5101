//! Path helpers for download destinations.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

/// Suffix marking an in-progress download next to its destination.
pub const TEMP_SUFFIX: &str = ".downloading";

/// Longest file name (in bytes) we will write; most filesystems cap at 255.
const MAX_FILE_NAME_BYTES: usize = 200;

/// Control characters plus everything Windows or POSIX rejects in a file name.
const UNSAFE_CHARS_PATTERN: &str = r#"[\x00-\x1f<>:"/\\|?*]"#;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(UNSAFE_CHARS_PATTERN).expect("unsafe-chars pattern should compile"));

/// Make an attachment name safe to use as a single path component.
///
/// Replaces path separators and characters rejected by common filesystems,
/// trims trailing dots/spaces (Windows), and caps the byte length while
/// keeping the extension.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = UNSAFE_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_end_matches(['.', ' ']).to_string();

    let cleaned = if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "file".to_string()
    } else {
        cleaned
    };

    if cleaned.len() <= MAX_FILE_NAME_BYTES {
        return cleaned;
    }

    let (stem, ext) = match cleaned.rfind('.') {
        Some(pos) if cleaned.len() - pos <= 16 => (&cleaned[..pos], &cleaned[pos..]),
        _ => (cleaned.as_str(), ""),
    };
    let mut cut = MAX_FILE_NAME_BYTES - ext.len();
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], ext)
}

/// Path of the sibling temp file used while `dest` is being written.
pub fn temp_path_for(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

//! Shared utility functions.
//!
//! This module contains reusable utilities used across the codebase:
//! - `format`: Human-readable formatting (sizes, etc.)
//! - `paths`: File-name sanitising and temp-file naming
//! - `serde_helpers`: Lenient deserializers for API and config values

mod format;
mod paths;
mod serde_helpers;

pub use format::{format_size, truncate_filename};
pub use paths::{sanitize_file_name, temp_path_for, TEMP_SUFFIX};
pub use serde_helpers::string_or_number;

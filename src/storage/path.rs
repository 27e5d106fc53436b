//! Placement of attachment files inside the blob store.
//!
//! Paths use `/` separators regardless of platform so encoded keys stay portable.

use crate::constants::storage::THUMBNAIL_PREFIX;
use chrono::{DateTime, Datelike, Utc};

pub trait FilePathGenerator: Send + Sync {
    /// Directory shared by every attachment of a launch in a given month.
    fn generate(&self, log_time: DateTime<Utc>, project_id: i64, launch_id: i64) -> String;
}

/// `{project}/{YYYY}-{MM}/{launch}`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFilePathGenerator;

impl FilePathGenerator for DefaultFilePathGenerator {
    fn generate(&self, log_time: DateTime<Utc>, project_id: i64, launch_id: i64) -> String {
        format!(
            "{}/{:04}-{:02}/{}",
            project_id,
            log_time.year(),
            log_time.month(),
            launch_id
        )
    }
}

/// `{log_id}-{original}`, with path separators in the original name replaced.
///
/// The log id prefix keeps identically named files from one batch apart.
pub fn storage_file_name(log_id: i64, original_filename: &str) -> String {
    let cleaned: String = original_filename
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{log_id}-{cleaned}")
}

pub fn thumbnail_path(common_path: &str, file_name: &str) -> String {
    join(common_path, &format!("{THUMBNAIL_PREFIX}{file_name}"))
}

pub fn join(common_path: &str, file_name: &str) -> String {
    let trimmed = common_path.trim_end_matches('/');
    if trimmed.is_empty() {
        file_name.to_string()
    } else {
        format!("{trimmed}/{file_name}")
    }
}

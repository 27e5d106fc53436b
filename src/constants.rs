//! # System Constants
//!
//! Sequence names, defaults and PostgreSQL error classes shared by the
//! migration components.

/// Severity assigned to records whose document carries no level.
pub const DEFAULT_LOG_LEVEL: i32 = 30_000;

/// Sequence names used by `multi_nextval`
pub mod sequences {
    pub const LOG_ID_SEQ: &str = "log_id_seq";
    pub const ATTACHMENT_ID_SEQ: &str = "attachment_id_seq";
}

/// Blob store naming conventions
pub mod storage {
    /// Prefix placed in front of a file name to name its thumbnail variant.
    pub const THUMBNAIL_PREFIX: &str = "thumbnail-";

    /// Marker searched for in a declared content type to decide whether it is an image.
    pub const IMAGE_CONTENT_TYPE_MARKER: &str = "image";

    pub const DEFAULT_THUMBNAIL_WIDTH: u32 = 100;
    pub const DEFAULT_THUMBNAIL_HEIGHT: u32 = 55;
}

/// PostgreSQL SQLSTATE classes relevant to batch insertion.
///
/// Class `23` covers integrity constraint violations, class `22` covers data
/// exceptions such as `22021` (NUL byte in a text value).
pub mod sqlstate {
    pub const INTEGRITY_CONSTRAINT_CLASS: &str = "23";
    pub const DATA_EXCEPTION_CLASS: &str = "22";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const CHARACTER_NOT_IN_REPERTOIRE: &str = "22021";
}

/// PostgreSQL accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMETERS: usize = 65_535;

/// Defaults for batch processing
pub mod batch {
    pub const DEFAULT_BATCH_SIZE: usize = 500;
    pub const DEFAULT_MAX_INTEGRITY_RETRIES: u32 = 1;
}

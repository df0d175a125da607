//! Constants used throughout the FRS core crate.

/// Page size used by search when `_count` is absent.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Upper bound applied to `_count`.
pub const MAX_PAGE_SIZE: usize = 100;

/// Default directory for the file backend when one is requested without a path.
pub const DEFAULT_DATA_DIR: &str = "frs_data";

/// How many fresh ids are tried before create gives up.
pub const ID_ALLOCATION_ATTEMPTS: usize = 5;

/// Extension of version files written by the file backend.
pub const VERSION_FILE_EXTENSION: &str = "json";

/// Actor recorded when the caller does not identify itself.
pub const DEFAULT_ACTOR: &str = "anonymous";

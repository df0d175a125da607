//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the store. Nothing in
//! this crate reads environment variables during request handling; the binaries read them and
//! hand the raw values to the `*_from_env_value` helpers below.

use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::profile::ProfileSet;
use crate::{ConfigError, ConfigResult};

/// Store configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    default_page_size: usize,
    max_page_size: usize,
    require_version_token: bool,
    data_dir: Option<PathBuf>,
    profiles: ProfileSet,
}

impl StoreConfig {
    /// Create a new `StoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidInput`] if `max_page_size` is zero or smaller than
    /// `default_page_size`.
    pub fn new(
        default_page_size: usize,
        max_page_size: usize,
        require_version_token: bool,
        data_dir: Option<PathBuf>,
        profiles: ProfileSet,
    ) -> ConfigResult<Self> {
        if max_page_size == 0 {
            return Err(ConfigError::InvalidInput(
                "max page size must be greater than zero".into(),
            ));
        }
        if default_page_size > max_page_size {
            return Err(ConfigError::InvalidInput(format!(
                "default page size {default_page_size} exceeds max page size {max_page_size}"
            )));
        }

        Ok(Self {
            default_page_size,
            max_page_size,
            require_version_token,
            data_dir,
            profiles,
        })
    }

    pub fn default_page_size(&self) -> usize {
        self.default_page_size
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    pub fn require_version_token(&self) -> bool {
        self.require_version_token
    }

    /// Directory of the file backend; `None` means in-memory storage.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn profiles(&self) -> &ProfileSet {
        &self.profiles
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            require_version_token: true,
            data_dir: None,
            profiles: ProfileSet::default(),
        }
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a page size from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `default`.
pub fn page_size_from_env_value(value: Option<String>, default: usize) -> ConfigResult<usize> {
    match trimmed(value) {
        None => Ok(default),
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidInput(format!("'{v}' is not a valid page size"))),
    }
}

/// Parse a boolean flag (`true`/`false`/`1`/`0`/`yes`/`no`) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns `default`.
pub fn flag_from_env_value(value: Option<String>, default: bool) -> ConfigResult<bool> {
    match trimmed(value).map(|v| v.to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidInput(format!(
                "'{v}' is not a valid boolean flag"
            ))),
        },
    }
}

/// Resolve an optional directory value to a path.
pub fn data_dir_from_env_value(value: Option<String>) -> Option<PathBuf> {
    trimmed(value).map(PathBuf::from)
}

/// Load the profile set from an optional YAML file path.
///
/// No path means no profiles.
pub fn profiles_from_env_value(value: Option<String>) -> ConfigResult<ProfileSet> {
    match trimmed(value) {
        None => Ok(ProfileSet::default()),
        Some(path) => ProfileSet::from_yaml_file(Path::new(&path)),
    }
}

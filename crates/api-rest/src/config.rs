//! Transport configuration, resolved once at startup.

/// Base URL used when `FRS_BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Address used when `FRS_REST_ADDR` is unset.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestConfig {
    base_url: String,
    api_key: Option<String>,
}

impl RestConfig {
    /// # Arguments
    ///
    /// * `base_url` - Public base for `Location` headers and Bundle links. A trailing `/` is
    ///   dropped.
    /// * `api_key` - When set, every resource route requires a matching `x-api-key` header.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// `<base>/<Type>/<id>`
    pub fn resource_url(&self, resource_type: &str, id: &str) -> String {
        format!("{}/{resource_type}/{id}", self.base_url)
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, None)
    }
}

/// Resolve the public base URL from an optional environment value. Blank means the default.
pub fn base_url_from_env_value(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_owned())
}

/// Resolve the API key from an optional environment value. Blank means no key.
pub fn api_key_from_env_value(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_trailing_slash() {
        let cfg = RestConfig::new("https://fhir.example.org/r4/", None);
        assert_eq!(cfg.base_url(), "https://fhir.example.org/r4");
        assert_eq!(
            cfg.resource_url("Patient", "p1"),
            "https://fhir.example.org/r4/Patient/p1"
        );
    }

    #[test]
    fn env_values_treat_blank_as_unset() {
        assert_eq!(base_url_from_env_value(None), DEFAULT_BASE_URL);
        assert_eq!(base_url_from_env_value(Some("  ".into())), DEFAULT_BASE_URL);
        assert_eq!(
            base_url_from_env_value(Some(" http://h:1 ".into())),
            "http://h:1"
        );
        assert_eq!(api_key_from_env_value(Some("".into())), None);
        assert_eq!(
            api_key_from_env_value(Some("s3cret".into())).as_deref(),
            Some("s3cret")
        );
    }
}

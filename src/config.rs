use crate::errors::ApiClientError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Client settings as read from a TOML table.
///
/// ```toml
/// base_url = "https://api.example.com/v1/"
/// timeout_ms = 30000
/// accept_language = "fr-FR"
///
/// [headers]
/// X-Api-Key = "secret"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSettings {
    pub base_url: Option<String>,
    /// Absent means requests never time out.
    pub timeout_ms: Option<u64>,
    pub accept_language: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl ClientSettings {
    pub fn from_toml_str(s: &str) -> Result<Self, ApiClientError> {
        Ok(toml::from_str(s)?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_table() {
        let settings = ClientSettings::from_toml_str(
            r#"
            base_url = "https://api.example.com/v1/"
            timeout_ms = 1500
            accept_language = "fr-FR"

            [headers]
            X-Api-Key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(settings.base_url.as_deref(), Some("https://api.example.com/v1/"));
        assert_eq!(settings.timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(settings.accept_language.as_deref(), Some("fr-FR"));
        assert_eq!(settings.headers.get("X-Api-Key").map(String::as_str), Some("secret"));
    }

    #[test]
    fn empty_table_means_defaults() {
        let settings = ClientSettings::from_toml_str("").unwrap();
        assert_eq!(settings, ClientSettings::default());
        assert_eq!(settings.timeout(), None);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ClientSettings::from_toml_str("retries = 3").unwrap_err();
        assert!(matches!(err, ApiClientError::InvalidSettings(_)));
    }
}

//! Indexer definitions and implementations
//!
//! Native Rust adapters for the site families the core ships with.
//!
//! # Adding a new indexer
//!
//! 1. Create a new file in this directory (e.g., `myindexer.rs`)
//! 2. Implement the `Indexer` trait plus its request generator and parser
//! 3. Add it to the `AVAILABLE_INDEXERS` list
//! 4. Construct it in [`build_indexer`]

pub mod gazelle;
pub mod newznab;

use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;

use crate::config::IndexerSettings;
use crate::error::IndexerError;
use crate::indexer::Indexer;
use crate::indexer::types::{DownloadProtocol, Privacy};

pub use gazelle::GazelleIndexer;
pub use newznab::NewznabIndexer;

/// Information about an available indexer type
#[derive(Debug, Clone)]
pub struct IndexerTypeInfo {
    /// Value of `implementation` in the indexer settings (e.g., "gazelle")
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub privacy: Privacy,
    pub protocol: DownloadProtocol,
    /// Language code
    pub language: &'static str,
    /// Credentials that must be present in the settings
    pub required_credentials: &'static [CredentialType],
    /// Optional settings
    pub optional_settings: &'static [SettingDefinition],
}

/// Definition of a configurable setting
#[derive(Debug, Clone)]
pub struct SettingDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub setting_type: SettingType,
    pub default_value: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub enum SettingType {
    Text,
    Checkbox,
}

/// List of all available native indexer types
pub static AVAILABLE_INDEXERS: Lazy<Vec<IndexerTypeInfo>> = Lazy::new(|| {
    vec![
        IndexerTypeInfo {
            id: "gazelle",
            name: "Gazelle",
            description: "Gazelle-based private tracker with form login",
            privacy: Privacy::Private,
            protocol: DownloadProtocol::Torrent,
            language: "en-US",
            required_credentials: &[CredentialType::Username, CredentialType::Password],
            optional_settings: &[SettingDefinition {
                key: "freeleech_only",
                label: "Search freeleech only",
                setting_type: SettingType::Checkbox,
                default_value: Some("false"),
            }],
        },
        IndexerTypeInfo {
            id: "newznab",
            name: "Newznab",
            description: "Generic Newznab-compatible Usenet indexer (NZBGeek, DrunkenSlug, etc.)",
            privacy: Privacy::Private,
            protocol: DownloadProtocol::Usenet,
            language: "en-US",
            required_credentials: &[CredentialType::ApiKey],
            optional_settings: &[],
        },
    ]
});

/// Get information about all available indexer types
pub fn get_available_indexers() -> &'static [IndexerTypeInfo] {
    &AVAILABLE_INDEXERS
}

/// Get information about a specific indexer type
pub fn get_indexer_info(id: &str) -> Option<&'static IndexerTypeInfo> {
    AVAILABLE_INDEXERS.iter().find(|i| i.id == id)
}

/// Credential types used by indexers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialType {
    ApiKey,
    Username,
    Password,
}

impl CredentialType {
    fn is_present(&self, settings: &IndexerSettings) -> bool {
        let value = match self {
            CredentialType::ApiKey => settings.api_key.as_deref(),
            CredentialType::Username => settings.username.as_deref(),
            CredentialType::Password => settings.password.as_deref(),
        };
        value.is_some_and(|v| !v.trim().is_empty())
    }
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialType::ApiKey => write!(f, "api_key"),
            CredentialType::Username => write!(f, "username"),
            CredentialType::Password => write!(f, "password"),
        }
    }
}

impl std::str::FromStr for CredentialType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "api_key" | "apikey" => Ok(CredentialType::ApiKey),
            "username" => Ok(CredentialType::Username),
            "password" => Ok(CredentialType::Password),
            _ => Err(anyhow::anyhow!("Unknown credential type: {}", s)),
        }
    }
}

/// Build an indexer from its settings.
///
/// Unknown implementations and missing credentials are reported as
/// [`IndexerError::Config`] inside the returned error.
pub fn build_indexer(settings: &IndexerSettings) -> Result<Arc<dyn Indexer>> {
    settings.validate()?;

    let info = get_indexer_info(&settings.implementation).ok_or_else(|| {
        IndexerError::Config(format!(
            "indexer '{}' uses unknown implementation '{}'",
            settings.id, settings.implementation
        ))
    })?;

    let missing: Vec<String> = info
        .required_credentials
        .iter()
        .filter(|c| !c.is_present(settings))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(IndexerError::Config(format!(
            "indexer '{}' is missing required credentials: {}",
            settings.id,
            missing.join(", ")
        ))
        .into());
    }

    let indexer: Arc<dyn Indexer> = match info.id {
        "gazelle" => Arc::new(GazelleIndexer::from_settings(settings)?),
        "newznab" => Arc::new(NewznabIndexer::from_settings(settings)?),
        other => {
            return Err(IndexerError::Config(format!("no constructor for '{}'", other)).into());
        }
    };
    Ok(indexer)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_registry() {
        let ids: Vec<_> = get_available_indexers().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["gazelle", "newznab"]);
        assert!(get_indexer_info("cardigann").is_none());
    }

    #[test]
    fn test_build_gazelle() {
        let mut settings = IndexerSettings::new("bb", "gazelle", "https://bb.example");
        settings.username = Some("me".into());
        settings.password = Some("secret".into());

        let indexer = build_indexer(&settings).unwrap();
        assert_eq!(indexer.id(), "bb");
        assert!(indexer.requires_login());
        assert_eq!(indexer.site_link(), "https://bb.example/");
    }

    #[test]
    fn test_missing_credentials_is_config_error() {
        let mut settings = IndexerSettings::new("bb", "gazelle", "https://bb.example");
        settings.username = Some("me".into());

        let err = build_indexer(&settings).err().unwrap();
        assert_matches!(
            err.downcast_ref::<IndexerError>(),
            Some(IndexerError::Config(msg)) if msg.contains("password")
        );
    }

    #[test]
    fn test_unknown_implementation() {
        let settings = IndexerSettings::new("x", "cardigann", "https://x.example");
        let err = build_indexer(&settings).err().unwrap();
        assert_matches!(err.downcast_ref::<IndexerError>(), Some(IndexerError::Config(_)));
    }

    #[test]
    fn test_credential_type_from_str() {
        assert_eq!("apikey".parse::<CredentialType>().unwrap(), CredentialType::ApiKey);
        assert!("cookie".parse::<CredentialType>().is_err());
    }
}

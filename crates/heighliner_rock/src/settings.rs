// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Connection settings for a Rock instance.

use std::{fmt, path::Path, time::Duration};

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// Where Rock lives and how to authenticate with it.
///
/// Settings are usually loaded from the site settings document, which keeps them under a
/// top-level `rock` key:
///
/// ```
/// use heighliner_rock::RockSettings;
///
/// let settings = RockSettings::from_json_str(r#"{
///     "rock": {
///         "baseURL": "https://rock.example.com/",
///         "tokenName": "Authorization-Token",
///         "token": "s3cr3t",
///         "cacheTtlSecs": 300
///     }
/// }"#)?;
///
/// assert_eq!(settings.base_url, "https://rock.example.com/");
/// settings.validate()?;
/// # Ok::<(), heighliner_rock::Error>(())
/// ```
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RockSettings {
    /// Base URL of the Rock site, including the trailing slash. Requests go to
    /// `<base_url>api/<endpoint>`.
    #[serde(rename = "baseURL")]
    pub base_url: String,

    /// Name of the header that carries the API token.
    pub token_name: String,

    /// The API token.
    pub token: String,

    /// How long memoized reads stay fresh. Without a value they live until invalidated.
    pub cache_ttl_secs: Option<u64>,
}

impl fmt::Debug for RockSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RockSettings")
            .field("base_url", &self.base_url)
            .field("token_name", &self.token_name)
            .field("token", &"***")
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .finish()
    }
}

impl RockSettings {
    /// Parses settings from JSON, either the settings object itself or a document that
    /// holds it under `rock`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSettings`] if the JSON does not describe settings.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut document: Value = serde_json::from_str(json).map_err(Error::InvalidSettings)?;
        let settings = match document.get_mut("rock") {
            Some(rock) if rock.is_object() => rock.take(),
            _ => document,
        };
        Self::deserialize(settings).map_err(Error::InvalidSettings)
    }

    /// Reads settings from a JSON file; see [`from_json_str`](Self::from_json_str).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadSettings`] if the file cannot be read and
    /// [`Error::InvalidSettings`] if it does not describe settings.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| Error::ReadSettings {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Checks that the base URL, token name and token are all present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredentials`] if any of them is empty.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() || self.token_name.is_empty() || self.token.is_empty() {
            return Err(Error::MissingCredentials);
        }
        Ok(())
    }

    /// The configured freshness of memoized reads.
    #[must_use]
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

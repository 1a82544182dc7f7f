//! Secrets file loading.
//!
//! ```json
//! { "hostKey": "...", "modKey": "...", "apiKey": "..." }
//! ```
//!
//! Every field is optional. Empty values count as absent, and absent keys
//! are generated.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::AccessKeys;

#[derive(Debug, Error)]
pub enum SecretsError {
    #[error("secrets file '{path}' could not be read: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("secrets file '{path}' is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretsFile {
    host_key: Option<String>,
    mod_key: Option<String>,
    api_key: Option<String>,
}

/// Values read from the secrets file
#[derive(Debug, Clone)]
pub struct Secrets {
    pub keys: AccessKeys,
    /// Key for the `Default` inference API
    pub api_key: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Load the secrets file, generating whatever it does not provide.
///
/// A missing file is not an error.
pub async fn load_secrets(path: &Path) -> Result<Secrets, SecretsError> {
    let file = match tokio::fs::read_to_string(path).await {
        Ok(text) => serde_json::from_str::<SecretsFile>(&text).map_err(|source| {
            SecretsError::Parse {
                path: path.display().to_string(),
                source,
            }
        })?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(
                "No secrets file at {}, generating access keys",
                path.display()
            );
            SecretsFile::default()
        }
        Err(source) => {
            return Err(SecretsError::Io {
                path: path.display().to_string(),
                source,
            });
        }
    };

    let generated = AccessKeys::generate();
    let host = non_empty(file.host_key).unwrap_or_else(|| generated.host().to_string());
    let moderator = non_empty(file.mod_key).unwrap_or_else(|| generated.moderator().to_string());

    Ok(Secrets {
        keys: AccessKeys::new(host, moderator),
        api_key: non_empty(file.api_key),
    })
}

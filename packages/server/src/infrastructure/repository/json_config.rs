//! JSON file backed [`ConfigRepository`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::domain::{ConfigRepository, ConfigStoreError, SessionConfig};

/// Stores the session configuration as pretty-printed JSON.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// reader never sees a half-written file.
pub struct JsonConfigRepository {
    path: PathBuf,
}

impl JsonConfigRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "config.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ConfigRepository for JsonConfigRepository {
    async fn load(&self) -> Result<Option<SessionConfig>, ConfigStoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn save(&self, config: &SessionConfig) -> Result<(), ConfigStoreError> {
        let json = serde_json::to_string_pretty(config)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        tracing::debug!("Session config written to {}", self.path.display());
        Ok(())
    }
}

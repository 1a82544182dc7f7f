//! Catalog file access (character cards, sampler presets, instruct formats).

use async_trait::async_trait;
use serde_json::Value;

use super::{CatalogEntry, CharacterCard, FileRepositoryError};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileRepository: Send + Sync {
    async fn character_list(&self) -> Result<Vec<CatalogEntry>, FileRepositoryError>;

    async fn instruct_list(&self) -> Result<Vec<CatalogEntry>, FileRepositoryError>;

    async fn sampler_preset_list(&self) -> Result<Vec<CatalogEntry>, FileRepositoryError>;

    /// `filename` is relative to the catalog root
    async fn read_character(&self, filename: &str) -> Result<CharacterCard, FileRepositoryError>;

    /// Read a preset or instruct format as raw JSON
    async fn read_json(&self, filename: &str) -> Result<Value, FileRepositoryError>;
}

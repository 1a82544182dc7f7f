//! Filesystem backed [`FileRepository`].
//!
//! Catalogs live in three directories below the data root:
//!
//! ```text
//! <root>/characters/*.json
//! <root>/instructFormats/*.json
//! <root>/api-presets/*.json
//! ```
//!
//! Filenames handed out and accepted are relative to the root
//! (`characters/CodingSensei.json`).

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{CatalogEntry, CharacterCard, FileRepository, FileRepositoryError};

const CHARACTER_DIR: &str = "characters";
const INSTRUCT_DIR: &str = "instructFormats";
const PRESET_DIR: &str = "api-presets";

pub struct FsFileRepository {
    root: PathBuf,
}

impl FsFileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the catalog directories if they do not exist yet
    pub async fn ensure_layout(&self) -> std::io::Result<()> {
        for dir in [CHARACTER_DIR, INSTRUCT_DIR, PRESET_DIR] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }
        Ok(())
    }

    /// Map a catalog-relative filename onto the data root.
    ///
    /// Only plain relative paths are accepted.
    fn resolve(&self, filename: &str) -> Result<PathBuf, FileRepositoryError> {
        let relative = Path::new(filename);
        let plain = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if filename.is_empty() || !plain {
            return Err(FileRepositoryError::InvalidPath(filename.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn read_value(&self, filename: &str) -> Result<Value, FileRepositoryError> {
        let path = self.resolve(filename)?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| FileRepositoryError::Io {
                path: filename.to_string(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| FileRepositoryError::Parse {
            path: filename.to_string(),
            source,
        })
    }

    /// List `*.json` files of one catalog directory, sorted by filename.
    ///
    /// Files that fail to parse are skipped with a warning.
    async fn list(&self, dir: &str) -> Result<Vec<CatalogEntry>, FileRepositoryError> {
        let path = self.root.join(dir);
        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|source| FileRepositoryError::Io {
                path: dir.to_string(),
                source,
            })?;

        let mut filenames = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|source| FileRepositoryError::Io {
                path: dir.to_string(),
                source,
            })?
        {
            let file_path = entry.path();
            if file_path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(name) = file_path.file_name().and_then(|n| n.to_str()) {
                filenames.push(format!("{}/{}", dir, name));
            }
        }
        filenames.sort();

        let mut entries = Vec::with_capacity(filenames.len());
        for filename in filenames {
            match self.read_value(&filename).await {
                Ok(value) => {
                    let name = display_name(&value).unwrap_or_else(|| file_stem(&filename));
                    entries.push(CatalogEntry { filename, name });
                }
                Err(e) => tracing::warn!("Skipping catalog file: {}", e),
            }
        }
        Ok(entries)
    }
}

/// `name`, or `data.name` for v2 character cards
fn display_name(value: &Value) -> Option<String> {
    value
        .get("name")
        .or_else(|| value.get("data").and_then(|d| d.get("name")))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename)
        .to_string()
}

#[async_trait]
impl FileRepository for FsFileRepository {
    async fn character_list(&self) -> Result<Vec<CatalogEntry>, FileRepositoryError> {
        self.list(CHARACTER_DIR).await
    }

    async fn instruct_list(&self) -> Result<Vec<CatalogEntry>, FileRepositoryError> {
        self.list(INSTRUCT_DIR).await
    }

    async fn sampler_preset_list(&self) -> Result<Vec<CatalogEntry>, FileRepositoryError> {
        self.list(PRESET_DIR).await
    }

    async fn read_character(&self, filename: &str) -> Result<CharacterCard, FileRepositoryError> {
        let value = self.read_value(filename).await?;
        let first_mes = value
            .get("first_mes")
            .or_else(|| value.get("data").and_then(|d| d.get("first_mes")))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(CharacterCard {
            name: display_name(&value).unwrap_or_else(|| file_stem(filename)),
            first_mes,
        })
    }

    async fn read_json(&self, filename: &str) -> Result<Value, FileRepositoryError> {
        self.read_value(filename).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_repository() -> (tempfile::TempDir, FsFileRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = FsFileRepository::new(dir.path());
        repo.ensure_layout().await.unwrap();
        (dir, repo)
    }

    #[tokio::test]
    async fn test_character_list_reads_names() {
        // テスト項目: キャラクター一覧がファイル名順に表示名付きで返る
        // given (前提条件):
        let (dir, repo) = create_test_repository().await;
        let characters = dir.path().join(CHARACTER_DIR);
        std::fs::write(
            characters.join("b.json"),
            r#"{"name":"Coding Sensei","first_mes":"Hello {{user}}"}"#,
        )
        .unwrap();
        std::fs::write(
            characters.join("a.json"),
            r#"{"data":{"name":"Alice","first_mes":"Hi"}}"#,
        )
        .unwrap();
        std::fs::write(characters.join("notes.txt"), "ignored").unwrap();

        // when (操作):
        let list = repo.character_list().await.unwrap();

        // then (期待する結果):
        assert_eq!(
            list,
            vec![
                CatalogEntry {
                    filename: "characters/a.json".to_string(),
                    name: "Alice".to_string(),
                },
                CatalogEntry {
                    filename: "characters/b.json".to_string(),
                    name: "Coding Sensei".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_read_character_card() {
        // テスト項目: キャラクターカードから名前と最初のメッセージを読み出せる
        // given (前提条件):
        let (dir, repo) = create_test_repository().await;
        std::fs::write(
            dir.path().join(CHARACTER_DIR).join("sensei.json"),
            r#"{"name":"Sensei","first_mes":"Welcome, {{user}}."}"#,
        )
        .unwrap();

        // when (操作):
        let card = repo.read_character("characters/sensei.json").await.unwrap();

        // then (期待する結果):
        assert_eq!(card.name, "Sensei");
        assert_eq!(card.first_mes, "Welcome, {{user}}.");
    }

    #[tokio::test]
    async fn test_preset_without_name_uses_file_stem() {
        // テスト項目: name を持たないプリセットはファイル名の語幹で表示される
        // given (前提条件):
        let (dir, repo) = create_test_repository().await;
        std::fs::write(
            dir.path().join(PRESET_DIR).join("TC-Temp-2.json"),
            r#"{"temperature":2.0}"#,
        )
        .unwrap();

        // when (操作):
        let list = repo.sampler_preset_list().await.unwrap();
        let value = repo.read_json("api-presets/TC-Temp-2.json").await.unwrap();

        // then (期待する結果):
        assert_eq!(list[0].name, "TC-Temp-2");
        assert_eq!(value["temperature"], 2.0);
    }

    #[tokio::test]
    async fn test_parent_directory_is_rejected() {
        // テスト項目: データルートの外を指すパスは拒否される
        let (_dir, repo) = create_test_repository().await;
        let result = repo.read_json("../secrets.json").await;
        assert!(matches!(result, Err(FileRepositoryError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        // テスト項目: 存在しないファイルは I/O エラーになる
        let (_dir, repo) = create_test_repository().await;
        let result = repo.read_character("characters/nobody.json").await;
        assert!(matches!(result, Err(FileRepositoryError::Io { .. })));
    }
}

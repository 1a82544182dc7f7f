//! 共有セッション設定
//!
//! プロセス全体で 1 つの [`SessionConfig`] を保持します。変更は永続化が成功してから
//! メモリ上の値に反映されるため、クライアントが永続化前の値を観測することはありません。

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::{
    CatalogEntry, ConfigRepository, ConfigStoreError, ConfigUpdate, FileRepository, SessionConfig,
};

pub struct SessionState {
    config: RwLock<SessionConfig>,
    store: Arc<dyn ConfigRepository>,
}

impl SessionState {
    /// 保存済みの設定を読み込む。未保存なら既定値を書き出して使う
    pub async fn load(store: Arc<dyn ConfigRepository>) -> Result<Self, ConfigStoreError> {
        let config = match store.load().await? {
            Some(config) => config,
            None => {
                tracing::warn!("No saved session config, writing defaults");
                let config = SessionConfig::default();
                store.save(&config).await?;
                config
            }
        };
        Ok(Self {
            config: RwLock::new(config),
            store,
        })
    }

    pub async fn snapshot(&self) -> SessionConfig {
        self.config.read().await.clone()
    }

    /// 変更を永続化してから反映し、反映後の値を返す
    ///
    /// 永続化に失敗した場合、メモリ上の値は変更されない。
    pub async fn apply(&self, update: ConfigUpdate) -> Result<SessionConfig, ConfigStoreError> {
        let mut config = self.config.write().await;
        let mut candidate = config.clone();
        update.apply_to(&mut candidate);
        self.store.save(&candidate).await?;
        *config = candidate.clone();
        Ok(candidate)
    }

    /// サンプラー設定と instruct 形式の中身が未読込なら、選択中のファイルから読み込む
    pub async fn hydrate_catalog_values(&self, files: &dyn FileRepository) {
        let config = self.snapshot().await;
        if config.samplers.is_null() {
            match files.read_json(&config.selected_preset).await {
                Ok(samplers) => {
                    let update = ConfigUpdate::SamplerPreset {
                        filename: config.selected_preset.clone(),
                        samplers,
                    };
                    if let Err(e) = self.apply(update).await {
                        tracing::error!("Failed to persist sampler preset: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Sampler preset not loaded: {}", e),
            }
        }
        if config.instruct_sequences.is_null() {
            match files.read_json(&config.instruct_format).await {
                Ok(sequences) => {
                    let update = ConfigUpdate::InstructFormat {
                        filename: config.instruct_format.clone(),
                        sequences,
                    };
                    if let Err(e) = self.apply(update).await {
                        tracing::error!("Failed to persist instruct format: {}", e);
                    }
                }
                Err(e) => tracing::warn!("Instruct format not loaded: {}", e),
            }
        }
    }

    /// キャラクターが未選択なら、カタログの先頭を選択して永続化する
    pub async fn ensure_character(
        &self,
        cards: &[CatalogEntry],
    ) -> Result<SessionConfig, ConfigStoreError> {
        let config = self.snapshot().await;
        match cards.first() {
            Some(first) if config.selected_character.is_empty() => {
                tracing::info!("No character selected, defaulting to {}", first.filename);
                self.apply(ConfigUpdate::Character {
                    filename: first.filename.clone(),
                    display_name: first.name.clone(),
                })
                .await
            }
            _ => Ok(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MockConfigRepository, MockFileRepository};
    use serde_json::json;

    fn store_with(saved: Option<SessionConfig>) -> MockConfigRepository {
        let mut store = MockConfigRepository::new();
        store.expect_load().returning(move || Ok(saved.clone()));
        store
    }

    #[tokio::test]
    async fn test_load_writes_defaults_when_missing() {
        // テスト項目: 設定が未保存なら既定値が書き出される
        // given (前提条件):
        let mut store = store_with(None);
        store
            .expect_save()
            .withf(|config| *config == SessionConfig::default())
            .times(1)
            .returning(|_| Ok(()));

        // when (操作):
        let state = SessionState::load(Arc::new(store)).await.unwrap();

        // then (期待する結果):
        assert_eq!(state.snapshot().await, SessionConfig::default());
    }

    #[tokio::test]
    async fn test_apply_persists_before_swap() {
        // テスト項目: 変更は永続化された値として反映される
        // given (前提条件):
        let mut store = store_with(Some(SessionConfig::default()));
        store
            .expect_save()
            .withf(|config| !config.is_auto_response)
            .times(1)
            .returning(|_| Ok(()));
        let state = SessionState::load(Arc::new(store)).await.unwrap();

        // when (操作):
        let updated = state.apply(ConfigUpdate::AutoResponse(false)).await.unwrap();

        // then (期待する結果):
        assert!(!updated.is_auto_response);
        assert!(!state.snapshot().await.is_auto_response);
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_config_unchanged() {
        // テスト項目: 永続化に失敗した変更は反映されない
        // given (前提条件):
        let mut store = store_with(Some(SessionConfig::default()));
        store.expect_save().returning(|_| {
            Err(ConfigStoreError::Io(std::io::Error::other("disk full")))
        });
        let state = SessionState::load(Arc::new(store)).await.unwrap();

        // when (操作):
        let result = state.apply(ConfigUpdate::ContextSize(8192)).await;

        // then (期待する結果):
        assert!(result.is_err());
        assert_eq!(state.snapshot().await.context_size, 2048);
    }

    #[tokio::test]
    async fn test_hydrate_reads_selected_files() {
        // テスト項目: 未読込のサンプラーと instruct 形式がファイルから読み込まれる
        // given (前提条件):
        let mut store = store_with(Some(SessionConfig::default()));
        store.expect_save().times(2).returning(|_| Ok(()));
        let state = SessionState::load(Arc::new(store)).await.unwrap();
        let mut files = MockFileRepository::new();
        files
            .expect_read_json()
            .withf(|name| name.starts_with("api-presets/"))
            .returning(|_| Ok(json!({"temperature": 2.0})));
        files
            .expect_read_json()
            .withf(|name| name.starts_with("instructFormats/"))
            .returning(|_| Ok(json!({"input_sequence": "### User:"})));

        // when (操作):
        state.hydrate_catalog_values(&files).await;

        // then (期待する結果):
        let config = state.snapshot().await;
        assert_eq!(config.samplers["temperature"], 2.0);
        assert_eq!(config.instruct_sequences["input_sequence"], "### User:");
    }

    #[tokio::test]
    async fn test_ensure_character_selects_first_card() {
        // テスト項目: キャラクター未選択時はカタログの先頭が選ばれる
        // given (前提条件):
        let saved = SessionConfig {
            selected_character: String::new(),
            ..SessionConfig::default()
        };
        let mut store = store_with(Some(saved));
        store.expect_save().times(1).returning(|_| Ok(()));
        let state = SessionState::load(Arc::new(store)).await.unwrap();
        let cards = vec![CatalogEntry {
            filename: "characters/alice.json".to_string(),
            name: "Alice".to_string(),
        }];

        // when (操作):
        let config = state.ensure_character(&cards).await.unwrap();

        // then (期待する結果):
        assert_eq!(config.selected_character, "characters/alice.json");
        assert_eq!(config.selected_char_display_name, "Alice");
    }
}

//! 推論 API の登録・切り替え・疎通確認

use crate::{
    domain::{ApiRecord, Client, ConfigUpdate, Role},
    infrastructure::dto::websocket::{
        ApiRecordDto, ModelListValue, OutboundMessage, TestApiOutcome,
    },
    usecase::{broadcast::Audience, error::DispatchError},
};

use super::{Dispatched, Router};

impl Router {
    /// API を登録（同名なら更新）し、一覧と登録内容をホストにだけ送る
    ///
    /// 一覧にはキーが含まれるため、ゲストには送らない。
    pub(super) async fn add_new_api(
        &self,
        api: ApiRecordDto,
    ) -> Result<Dispatched, DispatchError> {
        let record = ApiRecord::from(api);
        self.repository.upsert_api(record.clone()).await?;
        tracing::info!("Registered API '{}' at {}", record.name, record.endpoint);

        let api_list = self
            .repository
            .get_apis()
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        let selected_api = self.session.snapshot().await.selected_api;
        self.broadcaster
            .send(
                &OutboundMessage::ApiList {
                    api_list,
                    selected_api,
                },
                Audience::Role(Role::Host),
            )
            .await;
        self.broadcaster
            .send(
                &OutboundMessage::ApiChange(record.into()),
                Audience::Role(Role::Host),
            )
            .await;
        Ok(Dispatched::Done)
    }

    /// 登録済みの API に切り替える。選択中のモデルはクリアされる
    pub(super) async fn api_change(&self, name: String) -> Result<Dispatched, DispatchError> {
        let Some(record) = self.repository.get_api(&name).await? else {
            tracing::warn!("Ignoring switch to unknown API '{}'", name);
            return Ok(Dispatched::Done);
        };
        self.session.apply(ConfigUpdate::Api(record.name.clone())).await?;
        self.broadcaster
            .send(
                &OutboundMessage::ApiChange(record.into()),
                Audience::Role(Role::Host),
            )
            .await;
        Ok(Dispatched::Done)
    }

    /// 疎通確認の結果を要求者にだけ返す
    pub(super) async fn test_new_api(
        &self,
        requester: &Client,
        api: ApiRecordDto,
    ) -> Result<Dispatched, DispatchError> {
        let record = ApiRecord::from(api);
        let value = match self.provider.test_api(&record).await {
            Ok(message) => TestApiOutcome {
                success: true,
                message,
            },
            Err(e) => {
                tracing::warn!("API test against '{}' failed: {}", record.endpoint, e);
                TestApiOutcome {
                    success: false,
                    message: e.to_string(),
                }
            }
        };
        self.broadcaster
            .send_to(&requester.id, &OutboundMessage::TestApiResult { value })
            .await;
        Ok(Dispatched::Done)
    }

    /// モデル一覧を要求者にだけ返す。失敗時は `"ERROR"`
    pub(super) async fn model_list_request(
        &self,
        requester: &Client,
        api: ApiRecordDto,
    ) -> Result<Dispatched, DispatchError> {
        let record = ApiRecord::from(api);
        let value = match self.provider.list_models(&record).await {
            Ok(models) => ModelListValue::Models(models),
            Err(e) => {
                tracing::warn!("Model list from '{}' failed: {}", record.endpoint, e);
                ModelListValue::ERROR
            }
        };
        self.broadcaster
            .send_to(&requester.id, &OutboundMessage::ModelListResult { value })
            .await;
        Ok(Dispatched::Done)
    }
}

//! UseCase 層のエラー型

use thiserror::Error;

use crate::domain::{
    ConfigStoreError, FileRepositoryError, InferenceError, RepositoryError, Role,
    ValueObjectError,
};

/// 接続処理のエラー
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("a username is required for client '{0}'")]
    UsernameRequired(String),

    #[error(transparent)]
    InvalidValue(#[from] ValueObjectError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// 受信フレームの処理エラー
///
/// どのエラーも接続を切断せず、受信ループでログに記録されます。
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("client '{0}' is not registered")]
    UnknownClient(String),

    #[error("'{kind}' requires the host role, sender is '{role}'")]
    Unauthorized { kind: String, role: Role },

    #[error(transparent)]
    InvalidValue(#[from] ValueObjectError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    File(#[from] FileRepositoryError),

    #[error(transparent)]
    Config(#[from] ConfigStoreError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

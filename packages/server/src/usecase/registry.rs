//! 接続中クライアントのレジストリ
//!
//! クライアント ID をキーに、接続中クライアントのメタデータ（名前・色・ロール）と
//! 参加順を保持します。送信キューは MessagePusher に登録され、レジストリから
//! 削除されると同時に解放されます。
//!
//! 同じ ID で再接続すると古い接続は置き換えられます。古い送信キューは閉じられ、
//! 古い接続が持つ `ConnectionToken` では新しいエントリを削除できません。
//!
//! 全ての変更は 1 つの Mutex で直列化されます。

use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::domain::{Client, ClientId, MessagePusher, PusherChannel, Role, Username};

/// 1 回の接続を識別するトークン（登録ごとに異なる）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionToken(u64);

struct Entry {
    client: Client,
    token: ConnectionToken,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<ClientId, Entry>,
    next_token: u64,
}

pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    message_pusher: Arc<dyn MessagePusher>,
}

impl ConnectionRegistry {
    pub fn new(message_pusher: Arc<dyn MessagePusher>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            message_pusher,
        }
    }

    /// クライアントを登録し、送信キューを MessagePusher に接続する
    ///
    /// 同じ ID のクライアントが接続中の場合はそのエントリを置き換え、
    /// 古い送信キューを閉じる。トークンは単調増加なので参加順にも使う。
    pub async fn register(&self, client: Client, channel: PusherChannel) -> ConnectionToken {
        let mut inner = self.inner.lock().await;
        inner.next_token += 1;
        let token = ConnectionToken(inner.next_token);
        if inner.entries.contains_key(&client.id) {
            tracing::info!(
                "Client '{}' reconnected, replacing the previous connection",
                client.id
            );
        }
        // 古い sender はここで drop され、古い接続の pusher_loop が終了する
        self.message_pusher
            .register_client(client.id.clone(), channel)
            .await;
        tracing::debug!("Client '{}' registered as {}", client.id, client.role);
        inner
            .entries
            .insert(client.id.clone(), Entry { client, token });
        token
    }

    pub async fn lookup(&self, id: &ClientId) -> Option<Client> {
        let inner = self.inner.lock().await;
        inner.entries.get(id).map(|e| e.client.clone())
    }

    /// `token` の接続がまだ登録されていれば削除する。削除された場合のみ true（冪等）
    ///
    /// 同じ ID で再接続された後の古いトークンでは何も削除しない。
    pub async fn remove(&self, id: &ClientId, token: ConnectionToken) -> bool {
        let mut inner = self.inner.lock().await;
        let current = inner.entries.get(id).is_some_and(|e| e.token == token);
        if current {
            inner.entries.remove(id);
            self.message_pusher.unregister_client(id).await;
        }
        current
    }

    /// 接続中クライアントの一覧（参加順）
    pub async fn snapshot(&self) -> Vec<Client> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<&Entry> = inner.entries.values().collect();
        entries.sort_by_key(|e| e.token.0);
        entries.into_iter().map(|e| e.client.clone()).collect()
    }

    pub async fn set_role(&self, id: &ClientId, role: Role) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(id) {
            Some(entry) => {
                entry.client.role = role;
                true
            }
            None => false,
        }
    }

    /// 表示名を変更し、変更前の名前を返す
    pub async fn rename(&self, id: &ClientId, username: Username) -> Option<Username> {
        let mut inner = self.inner.lock().await;
        inner
            .entries
            .get_mut(id)
            .map(|entry| std::mem::replace(&mut entry.client.username, username))
    }

    /// 全クライアントを削除し、全ての送信キューを閉じる
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.entries.len();
        inner.entries.clear();
        self.message_pusher.unregister_all().await;
        count
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

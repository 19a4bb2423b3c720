//! LINE Messaging API のプッシュメッセージ送信。
//!
//! 送信は投げっぱなしで、失敗してもログに残すだけで呼び出し元には伝えない。

use std::fmt;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::version::USER_AGENT;

pub const PUSH_ENDPOINT: &str = "https://api.line.me/v2/bot/message/push";

/// チャネルアクセストークンと送信先ユーザー ID。
#[derive(Clone, PartialEq, Eq)]
pub struct LineCredentials {
    pub token: String,
    pub user_id: String,
}

impl LineCredentials {
    /// どちらかが空なら `None`。
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let user_id = user_id.into();
        if token.trim().is_empty() || user_id.trim().is_empty() {
            return None;
        }
        Some(Self { token, user_id })
    }

    /// 環境変数 `LINE_TOKEN` と `LINE_USER_ID` から読み込む。
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("LINE_TOKEN").ok()?;
        let user_id = std::env::var("LINE_USER_ID").ok()?;
        Self::new(token, user_id)
    }
}

impl fmt::Debug for LineCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineCredentials")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// プッシュメッセージのリクエストボディ。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub messages: Vec<TextMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl PushMessage {
    pub fn text(to: &str, text: &str) -> Self {
        Self {
            to: to.to_string(),
            messages: vec![TextMessage {
                kind: "text",
                text: text.to_string(),
            }],
        }
    }
}

/// プッシュメッセージを実際に送る経路。
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn push(&self, token: &str, message: &PushMessage) -> Result<()>;
}

/// reqwest で LINE の push エンドポイントに POST する。
pub struct HttpPushTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPushTransport {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(PUSH_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client for LINE")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn push(&self, token: &str, message: &PushMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(message)
            .send()
            .await
            .context("LINE push request failed")?;

        // 本文は検証しない。ステータスだけログ用に見る
        if !response.status().is_success() {
            anyhow::bail!("LINE push returned status {}", response.status());
        }
        Ok(())
    }
}

/// メッセージの通知先。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// メッセージを送る。失敗は呼び出し元に返さない。
    async fn send(&self, message: &str);
}

/// LINE へ通知する `Notifier`。
///
/// 認証情報がない場合は何もしない。
pub struct LineNotifier<T> {
    credentials: Option<LineCredentials>,
    transport: T,
}

impl<T: PushTransport> LineNotifier<T> {
    pub fn new(credentials: Option<LineCredentials>, transport: T) -> Self {
        Self {
            credentials,
            transport,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }
}

#[async_trait]
impl<T: PushTransport> Notifier for LineNotifier<T> {
    async fn send(&self, message: &str) {
        let Some(credentials) = &self.credentials else {
            debug!("LINE credentials are not set, skipping notification");
            return;
        };

        let body = PushMessage::text(&credentials.user_id, message);
        match self.transport.push(&credentials.token, &body).await {
            Ok(()) => info!(chars = message.chars().count(), "LINE notification sent"),
            Err(e) => warn!(error = %e, "Failed to send LINE notification"),
        }
    }
}

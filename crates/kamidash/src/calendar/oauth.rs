//! Google OAuth 2.0 のアクセストークン取得。
//!
//! サーバーとして動くときはキャッシュ済みトークンだけを使い（期限切れならリフレッシュ）、
//! 初回の認可は `kamidash auth` から対話的に行う。

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt as _, BufReader};
use tracing::info;

use crate::version::USER_AGENT;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const CALENDAR_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// 期限の何秒前から期限切れとみなすか。
const EXPIRY_SKEW_SECONDS: i64 = 60;

/// アクセストークンの取得方法。
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// OAuth クライアントの情報（client_secret.json の `installed` または `web`）。
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

#[derive(Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

impl ClientSecret {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).context("Failed to read OAuth client secret")?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        let file: ClientSecretFile =
            serde_json::from_str(content).context("Failed to parse OAuth client secret")?;
        file.installed
            .or(file.web)
            .context("OAuth client secret has neither `installed` nor `web` section")
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or("http://localhost")
    }
}

/// キャッシュするトークン。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - TimeDelta::seconds(EXPIRY_SKEW_SECONDS) <= now)
    }
}

/// トークンエンドポイントのレスポンス。
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// リフレッシュ時は refresh_token が返らないことがあるので、以前のものを引き継ぐ。
    fn into_stored(self, now: DateTime<Utc>, previous_refresh: Option<String>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self
                .expires_in
                .map(|seconds| now + TimeDelta::seconds(seconds)),
        }
    }
}

/// トークンのキャッシュファイル。
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// キャッシュを読み込む。ファイルがなければ `None`。
    pub fn load(&self) -> Result<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path).context("Failed to read token cache")?;
        let token = serde_json::from_str(&content).context("Failed to parse token cache")?;
        Ok(Some(token))
    }

    /// 一時ファイルに書いてから置き換えるので、読み手が書きかけの内容を見ることはない。
    pub fn save(&self, token: &StoredToken) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let content =
            serde_json::to_string_pretty(token).context("Failed to serialize token cache")?;

        let mut temp =
            tempfile::NamedTempFile::new_in(dir).context("Failed to create temporary token file")?;
        temp.write_all(content.as_bytes())
            .context("Failed to write token cache")?;
        temp.persist(&self.path)
            .context("Failed to replace token cache")?;
        Ok(())
    }
}

/// トークンエンドポイントとの通信。
struct TokenEndpoint {
    http_client: reqwest::Client,
    url: String,
}

impl TokenEndpoint {
    fn new(url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client for OAuth")?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    async fn request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .http_client
            .post(&self.url)
            .form(form)
            .send()
            .await
            .context("OAuth token request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("OAuth token endpoint returned status {status}: {body}");
        }

        response
            .json()
            .await
            .context("Failed to parse OAuth token response")
    }
}

/// キャッシュ済みトークンを使うプロバイダ。
///
/// 期限切れの場合は refresh_token で更新し、キャッシュを書き換える。
/// キャッシュがなければエラーを返し、対話的な認可は行わない。
pub struct CachedTokenProvider {
    cache: TokenCache,
    client_secret_path: PathBuf,
    endpoint: TokenEndpoint,
}

impl CachedTokenProvider {
    pub fn new(cache: TokenCache, client_secret_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_token_endpoint(cache, client_secret_path, TOKEN_ENDPOINT)
    }

    pub fn with_token_endpoint(
        cache: TokenCache,
        client_secret_path: impl Into<PathBuf>,
        token_endpoint: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            cache,
            client_secret_path: client_secret_path.into(),
            endpoint: TokenEndpoint::new(token_endpoint)?,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<StoredToken> {
        let secret = ClientSecret::load(&self.client_secret_path)?;
        let response = self
            .endpoint
            .request(&[
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .await?;
        Ok(response.into_stored(Utc::now(), Some(refresh_token.to_string())))
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let token = self
            .cache
            .load()?
            .context("No cached calendar token; run `kamidash auth` first")?;

        if !token.is_expired(Utc::now()) {
            return Ok(token.access_token);
        }

        let refresh_token = token.refresh_token.context(
            "Cached calendar token has expired and cannot be refreshed; run `kamidash auth`",
        )?;
        let refreshed = self.refresh(&refresh_token).await?;
        self.cache.save(&refreshed)?;
        info!(path = ?self.cache.path(), "Refreshed calendar access token");

        Ok(refreshed.access_token)
    }
}

/// ブラウザでの同意を経てトークンを取得するプロバイダ。
pub struct InteractiveTokenProvider {
    secret: ClientSecret,
    cache: TokenCache,
    endpoint: TokenEndpoint,
}

impl InteractiveTokenProvider {
    pub fn new(secret: ClientSecret, cache: TokenCache) -> Result<Self> {
        Ok(Self {
            secret,
            cache,
            endpoint: TokenEndpoint::new(TOKEN_ENDPOINT)?,
        })
    }

    /// 同意画面の URL。
    pub fn authorization_url(&self) -> Result<Url> {
        Url::parse_with_params(
            AUTH_ENDPOINT,
            &[
                ("client_id", self.secret.client_id.as_str()),
                ("redirect_uri", self.secret.redirect_uri()),
                ("response_type", "code"),
                ("scope", CALENDAR_READONLY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .context("Failed to build authorization URL")
    }

    /// 同意画面の URL を表示し、標準入力から認可コードを受け取ってトークンを保存する。
    pub async fn authorize(&self) -> Result<StoredToken> {
        let url = self.authorization_url()?;
        println!("ブラウザで次の URL を開き、カレンダーへのアクセスを許可してください:\n\n{url}\n");
        println!("リダイレクト先の URL（または code パラメータの値）を貼り付けてください:");

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .context("Failed to read authorization code")?;
        let code = extract_code(&line).context("Authorization code is empty")?;

        let response = self
            .endpoint
            .request(&[
                ("code", code.as_str()),
                ("client_id", self.secret.client_id.as_str()),
                ("client_secret", self.secret.client_secret.as_str()),
                ("redirect_uri", self.secret.redirect_uri()),
                ("grant_type", "authorization_code"),
            ])
            .await?;

        let token = response.into_stored(Utc::now(), None);
        self.cache.save(&token)?;
        info!(path = ?self.cache.path(), "Saved calendar token");
        Ok(token)
    }
}

/// 有効なキャッシュがあればそれを使い、なければ同意画面から取得する。
#[async_trait]
impl TokenProvider for InteractiveTokenProvider {
    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.cache.load()?
            && !token.is_expired(Utc::now())
        {
            return Ok(token.access_token);
        }
        Ok(self.authorize().await?.access_token)
    }
}

/// 貼り付けられた文字列から認可コードを取り出す。
///
/// リダイレクト先の URL 全体が貼られた場合は `code` クエリパラメータを使う。
fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(input) {
        return url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned());
    }
    Some(input.to_string())
}

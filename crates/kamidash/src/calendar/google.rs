//! Google Calendar API v3 の events.list を使った予定取得。

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use reqwest::Url;
use serde::Deserialize;

use super::{CalendarEvent, EventSource, EventStart, TokenProvider, sort_and_limit};
use crate::version::USER_AGENT;

const CALENDARS_ENDPOINT: &str = "https://www.googleapis.com/calendar/v3/calendars";

/// タイトルのない予定の表示名。
const UNTITLED: &str = "(タイトルなし)";

/// Google カレンダーの予定取得クライアント。
pub struct GoogleCalendar<P> {
    http_client: reqwest::Client,
    endpoint: String,
    tokens: P,
    calendar_id: String,
    max_results: u32,
}

impl<P: TokenProvider> GoogleCalendar<P> {
    pub fn new(tokens: P, calendar_id: impl Into<String>, max_results: u32) -> Result<Self> {
        Self::with_endpoint(CALENDARS_ENDPOINT, tokens, calendar_id, max_results)
    }

    /// `endpoint` は `.../calendar/v3/calendars` に相当する URL。
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        tokens: P,
        calendar_id: impl Into<String>,
        max_results: u32,
    ) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client for Google Calendar")?;
        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
            tokens,
            calendar_id: calendar_id.into(),
            max_results,
        })
    }

    fn events_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint).context("Invalid calendar endpoint")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Calendar endpoint cannot be a base URL"))?
            .pop_if_empty()
            .push(&self.calendar_id)
            .push("events");
        Ok(url)
    }
}

#[async_trait]
impl<P: TokenProvider> EventSource for GoogleCalendar<P> {
    async fn fetch_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let token = self
            .tokens
            .access_token()
            .await
            .context("Failed to obtain calendar access token")?;

        let response = self
            .http_client
            .get(self.events_url()?)
            .bearer_auth(token)
            .query(&[
                (
                    "timeMin",
                    time_min.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                (
                    "timeMax",
                    time_max.to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
                ("maxResults", self.max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await
            .context("Google Calendar request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Google Calendar returned status {status}: {body}");
        }

        let list: EventList = response
            .json()
            .await
            .context("Failed to parse Google Calendar response")?;

        let events = list.into_events();
        tracing::debug!(count = events.len(), "Fetched calendar events");
        Ok(sort_and_limit(events, self.max_results as usize))
    }
}

/// events.list のレスポンスのうち使う部分。
#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    summary: Option<String>,
    start: Option<EventDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    date_time: Option<DateTime<FixedOffset>>,
    date: Option<NaiveDate>,
}

impl EventList {
    /// 開始日時を持たない予定は捨てる。
    fn into_events(self) -> Vec<CalendarEvent> {
        self.items
            .into_iter()
            .filter_map(|item| {
                let start = item.start?;
                let start = match (start.date_time, start.date) {
                    (Some(t), _) => EventStart::DateTime(t),
                    (None, Some(d)) => EventStart::Date(d),
                    (None, None) => return None,
                };
                let title = item
                    .summary
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| UNTITLED.to_string());
                Some(CalendarEvent { start, title })
            })
            .collect()
    }
}

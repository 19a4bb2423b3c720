//! 直近の予定を取得する外部カレンダー連携。
//!
//! 取得元は `EventSource` として抽象化し、Google カレンダー実装と
//! OAuth トークンの取得方法（キャッシュ / 対話的認可）を提供する。

mod google;
mod oauth;

pub use google::GoogleCalendar;
pub use oauth::{
    CachedTokenProvider, ClientSecret, InteractiveTokenProvider, TokenCache, TokenProvider,
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;

/// 予定の開始。終日予定は日付のみを持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStart {
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
}

impl EventStart {
    /// 並べ替え用の時刻。終日予定は JST の 0 時とみなす。
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            EventStart::DateTime(t) => t.to_utc(),
            EventStart::Date(d) => {
                let midnight = d.and_time(chrono::NaiveTime::MIN);
                Tokyo
                    .from_local_datetime(&midnight)
                    .earliest()
                    .map(|t| t.to_utc())
                    .unwrap_or_else(|| midnight.and_utc())
            }
        }
    }

    /// 表示用の `MM/DD HH:MM`（終日は `MM/DD 終日`）。
    pub fn label(&self) -> String {
        match self {
            EventStart::DateTime(t) => t.with_timezone(&Tokyo).format("%m/%d %H:%M").to_string(),
            EventStart::Date(d) => d.format("%m/%d 終日").to_string(),
        }
    }
}

/// カレンダーの予定。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub start: EventStart,
    pub title: String,
}

/// 予定の取得元。
#[async_trait]
pub trait EventSource: Send + Sync {
    /// `[time_min, time_max]` に含まれる予定を開始時刻の昇順で返す。
    async fn fetch_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>>;
}

/// 開始時刻の昇順に並べ、上限件数で切り詰める。
pub(crate) fn sort_and_limit(mut events: Vec<CalendarEvent>, limit: usize) -> Vec<CalendarEvent> {
    events.sort_by_key(|e| e.start.instant());
    events.truncate(limit);
    events
}

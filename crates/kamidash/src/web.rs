//! ダッシュボードの Web ページ。
//!
//! `GET /` でページを表示し、`POST /` でコメントを受け取って通知する。
//! ページの内容はリクエストごとに現在時刻から計算し直す。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use axum::routing::get;
use chrono::{DateTime, Datelike, TimeDelta};
use chrono_tz::Tz;
use handlebars::Handlebars;
use kamidash_core::{DateDisplayInfo, GymEvaluator, date_display_info, now_jst};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::calendar::EventSource;
use crate::config::GymHolidays;
use crate::line::Notifier;

const INDEX_TEMPLATE: &str = "index";

/// コメントを通知するときの見出し。
const COMMENT_PREFIX: &str = "📩 コメント通知：\n";

/// 通知後に表示するメッセージ。
pub const COMMENT_SENT: &str = "Botにコメントを送信しました。";

/// ページの各ブロックを組み立てるサービス。
pub struct Dashboard {
    gym_name: String,
    gym: GymEvaluator<GymHolidays>,
    events: Option<Arc<dyn EventSource>>,
    window: Duration,
    notifier: Arc<dyn Notifier>,
    templates: Handlebars<'static>,
}

#[derive(Debug, Serialize)]
struct PageContext<'a> {
    date: DateDisplayInfo,
    gym: GymView<'a>,
    events: EventsView,
    flash: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GymView<'a> {
    name: &'a str,
    status: String,
    open: bool,
    hours: String,
}

#[derive(Debug, Default, Serialize)]
struct EventsView {
    items: Vec<EventLine>,
    message: Option<String>,
    error: bool,
}

#[derive(Debug, Serialize)]
struct EventLine {
    start: String,
    title: String,
}

impl Dashboard {
    /// # Arguments
    /// * `events` - 予定の取得元。`None` ならカレンダー表示を無効にする
    /// * `window` - 現在時刻から何日先までの予定を表示するか
    pub fn new(
        gym_name: impl Into<String>,
        gym: GymEvaluator<GymHolidays>,
        events: Option<Arc<dyn EventSource>>,
        window: Duration,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let mut templates = Handlebars::new();
        templates
            .register_template_string(INDEX_TEMPLATE, include_str!("../templates/index.hbs"))
            .context("Failed to register page template")?;

        Ok(Self {
            gym_name: gym_name.into(),
            gym,
            events,
            window,
            notifier,
            templates,
        })
    }

    /// 指定時刻のページを描画する。
    ///
    /// 予定の取得に失敗してもページ全体は描画し、エラーは予定ブロックに表示する。
    pub async fn render(&self, now: DateTime<Tz>, flash: Option<&str>) -> Result<String> {
        let status = self.gym.status_at(&now);
        let context = PageContext {
            date: date_display_info(&now),
            gym: GymView {
                name: &self.gym_name,
                status: status.to_string(),
                open: status.is_open(),
                hours: self.gym.schedule().hours_for(now.weekday()).to_string(),
            },
            events: self.events_view(now).await,
            flash,
        };

        self.templates
            .render(INDEX_TEMPLATE, &context)
            .context("Failed to render page")
    }

    /// コメントを通知し、表示するメッセージを返す。空のコメントは何もしない。
    pub async fn submit_comment(&self, comment: &str) -> Option<&'static str> {
        if comment.is_empty() {
            return None;
        }
        self.notifier
            .send(&format!("{COMMENT_PREFIX}{comment}"))
            .await;
        Some(COMMENT_SENT)
    }

    async fn events_view(&self, now: DateTime<Tz>) -> EventsView {
        let Some(source) = &self.events else {
            return EventsView {
                message: Some("カレンダー連携は設定されていません。".to_string()),
                ..Default::default()
            };
        };

        let time_min = now.to_utc();
        let Some((window, time_max)) = TimeDelta::from_std(self.window)
            .ok()
            .and_then(|window| Some((window, time_min.checked_add_signed(window)?)))
        else {
            warn!(window = ?self.window, "Calendar window is out of range");
            return EventsView {
                message: Some(format!(
                    "予定を取得できませんでした: 表示期間 {} が長すぎます",
                    humantime::format_duration(self.window)
                )),
                error: true,
                ..Default::default()
            };
        };

        match source.fetch_events(time_min, time_max).await {
            Ok(events) if events.is_empty() => EventsView {
                message: Some(format!(
                    "今後{}日間の予定はありません。",
                    window.num_days()
                )),
                ..Default::default()
            },
            Ok(events) => EventsView {
                items: events
                    .into_iter()
                    .map(|e| EventLine {
                        start: e.start.label(),
                        title: e.title,
                    })
                    .collect(),
                ..Default::default()
            },
            Err(e) => {
                warn!(error = %e, "Failed to fetch calendar events");
                EventsView {
                    message: Some(format!("予定を取得できませんでした: {e:#}")),
                    error: true,
                    ..Default::default()
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentForm {
    #[serde(default)]
    comment: String,
}

pub fn router(dashboard: Arc<Dashboard>) -> Router {
    Router::new()
        .route("/", get(show_page).post(post_comment))
        .with_state(dashboard)
}

async fn show_page(State(dashboard): State<Arc<Dashboard>>) -> Response {
    render_page(&dashboard, None).await
}

async fn post_comment(
    State(dashboard): State<Arc<Dashboard>>,
    Form(form): Form<CommentForm>,
) -> Response {
    let flash = dashboard.submit_comment(&form.comment).await;
    render_page(&dashboard, flash).await
}

async fn render_page(dashboard: &Dashboard, flash: Option<&str>) -> Response {
    match dashboard.render(now_jst(), flash).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "Page rendering error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// HTTP サーバーを起動する。
pub async fn serve(listen: SocketAddr, dashboard: Arc<Dashboard>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {listen}"))?;
    info!(addr = %listen, "Listening");

    axum::serve(listener, router(dashboard))
        .await
        .context("Server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use chrono_tz::Asia::Tokyo;
    use kamidash_core::{ClosurePolicy, ExtraHolidays, JapaneseHolidays, WeeklySchedule};
    use serde_json::json;
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers};

    use crate::calendar::{CalendarEvent, EventStart};
    use crate::line::{HttpPushTransport, LineCredentials, LineNotifier};

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &str) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    struct FixedEvents(Vec<CalendarEvent>);

    #[async_trait]
    impl EventSource for FixedEvents {
        async fn fetch_events(
            &self,
            _time_min: chrono::DateTime<Utc>,
            _time_max: chrono::DateTime<Utc>,
        ) -> Result<Vec<CalendarEvent>> {
            Ok(self.0.clone())
        }
    }

    struct FailingEvents;

    #[async_trait]
    impl EventSource for FailingEvents {
        async fn fetch_events(
            &self,
            _time_min: chrono::DateTime<Utc>,
            _time_max: chrono::DateTime<Utc>,
        ) -> Result<Vec<CalendarEvent>> {
            Err(anyhow!("quota exceeded"))
        }
    }

    const WEEK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    fn gym() -> GymEvaluator<GymHolidays> {
        GymEvaluator::new(
            WeeklySchedule::default(),
            Some(ClosurePolicy::default()),
            ExtraHolidays::new(JapaneseHolidays, []),
        )
    }

    fn dashboard(
        events: Option<Arc<dyn EventSource>>,
        notifier: Arc<RecordingNotifier>,
    ) -> Dashboard {
        Dashboard::new("テストジム", gym(), events, WEEK, notifier).unwrap()
    }

    fn jst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Tz> {
        Tokyo.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[tokio::test]
    async fn renders_all_blocks() {
        let events = FixedEvents(vec![CalendarEvent {
            start: EventStart::Date(NaiveDate::from_ymd_opt(2024, 1, 17).unwrap()),
            title: "ゴミ出し".to_string(),
        }]);
        let page = dashboard(Some(Arc::new(events)), Arc::default())
            .render(jst(2024, 1, 16, 10, 30), None)
            .await
            .unwrap();

        assert!(page.contains("西暦：2024年01月16日"));
        assert!(page.contains("和暦：令和6年1月16日"));
        assert!(page.contains("時間：10:30"));
        assert!(page.contains("第3火曜日"));
        assert!(page.contains("テストジムの営業状況"));
        assert!(page.contains("🟢 営業中"));
        assert!(page.contains(r#"class="gym-status open""#));
        assert!(page.contains("07:00〜23:00"));
        assert!(page.contains("01/17 終日"));
        assert!(page.contains("ゴミ出し"));
    }

    #[tokio::test]
    async fn third_monday_shows_closure() {
        let page = dashboard(None, Arc::default())
            .render(jst(2024, 1, 15, 12, 0), None)
            .await
            .unwrap();
        assert!(page.contains("🔴 休館日（第3月曜日）"));
        assert!(page.contains(r#"class="gym-status closed""#));
        assert!(page.contains("カレンダー連携は設定されていません。"));
    }

    #[tokio::test]
    async fn calendar_error_is_inline() {
        let page = dashboard(Some(Arc::new(FailingEvents)), Arc::default())
            .render(jst(2024, 1, 16, 10, 30), None)
            .await
            .unwrap();
        assert!(page.contains("予定を取得できませんでした: quota exceeded"));
        assert!(page.contains("西暦：2024年01月16日"));
    }

    #[tokio::test]
    async fn empty_calendar_message() {
        let page = dashboard(Some(Arc::new(FixedEvents(vec![]))), Arc::default())
            .render(jst(2024, 1, 16, 10, 30), None)
            .await
            .unwrap();
        assert!(page.contains("今後7日間の予定はありません。"));
    }

    #[tokio::test]
    async fn comment_is_forwarded_with_prefix() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dashboard = dashboard(None, notifier.clone());

        let flash = dashboard.submit_comment("ジム行きます").await;
        assert_eq!(flash, Some(COMMENT_SENT));
        assert_eq!(
            *notifier.messages.lock().unwrap(),
            vec!["📩 コメント通知：\nジム行きます".to_string()]
        );

        let page = dashboard
            .render(jst(2024, 1, 16, 10, 30), flash)
            .await
            .unwrap();
        assert!(page.contains(COMMENT_SENT));
    }

    #[tokio::test]
    async fn every_submission_is_forwarded() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dashboard = dashboard(None, notifier.clone());
        dashboard.submit_comment("同じ").await;
        dashboard.submit_comment("同じ").await;
        assert_eq!(notifier.messages.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_comment_is_ignored() {
        let notifier = Arc::new(RecordingNotifier::default());
        let dashboard = dashboard(None, notifier.clone());
        assert_eq!(dashboard.submit_comment("").await, None);
        assert!(notifier.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_text_is_escaped() {
        let events = FixedEvents(vec![CalendarEvent {
            start: EventStart::Date(NaiveDate::from_ymd_opt(2024, 1, 17).unwrap()),
            title: "<script>alert(1)</script>".to_string(),
        }]);
        let page = dashboard(Some(Arc::new(events)), Arc::default())
            .render(jst(2024, 1, 16, 10, 30), None)
            .await
            .unwrap();
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }

    #[tokio::test]
    async fn oversized_window_is_inline_error() {
        let events: Arc<dyn EventSource> = Arc::new(FixedEvents(vec![]));
        let window = humantime::parse_duration("300000years").unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let dashboard = Dashboard::new("テストジム", gym(), Some(events), window, notifier).unwrap();

        let page = dashboard
            .render(jst(2024, 1, 16, 10, 30), None)
            .await
            .unwrap();
        assert!(page.contains("予定を取得できませんでした"));
        assert!(page.contains("西暦：2024年01月16日"));
        assert!(page.contains("🟢 営業中"));
    }

    #[tokio::test]
    async fn form_post_is_pushed_to_line() {
        let line = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/v2/bot/message/push"))
            .and(matchers::header("authorization", "Bearer tok"))
            .and(matchers::body_json(json!({
                "to": "U1",
                "messages": [{"type": "text", "text": "📩 コメント通知：\na b&c <x>"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&line)
            .await;

        let transport =
            HttpPushTransport::with_endpoint(format!("{}/v2/bot/message/push", line.uri()))
                .unwrap();
        let notifier = LineNotifier::new(LineCredentials::new("tok", "U1"), transport);
        let dashboard = Dashboard::new("テストジム", gym(), None, WEEK, Arc::new(notifier)).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(Arc::new(dashboard))).await });

        let client = reqwest::Client::new();
        let url = format!("http://{addr}/");

        let response = client.get(&url).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let page = response.text().await.unwrap();
        assert!(page.contains("テストジムの営業状況"));
        assert!(!page.contains(COMMENT_SENT));

        // 空のコメントは LINE に送らない
        let response = client
            .post(&url)
            .form(&[("comment", "")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(!response.text().await.unwrap().contains(COMMENT_SENT));

        let response = client
            .post(&url)
            .form(&[("comment", "a b&c <x>")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.text().await.unwrap().contains(COMMENT_SENT));
    }
}

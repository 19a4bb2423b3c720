use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use chrono::{NaiveDate, NaiveTime, Weekday};
use kamidash_core::{
    BusinessHours, ClosurePolicy, ExtraHolidays, GymEvaluator, JapaneseHolidays, WeeklySchedule,
};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// ダッシュボードで使う祝日カレンダー。
pub type GymHolidays = ExtraHolidays<JapaneseHolidays>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gym: GymConfig,
    /// 省略するとカレンダー表示を無効にする
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar: Option<CalendarConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 8501)),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GymConfig {
    pub name: String,
    /// 祝日扱いにする追加の日付
    #[serde_as(as = "Vec<DisplayFromStr>")]
    #[serde(default)]
    pub extra_holidays: Vec<NaiveDate>,
    #[serde(default)]
    pub hours: HoursConfig,
    /// 省略すると定休日なし
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closure: Option<ClosureConfig>,
}

impl Default for GymConfig {
    fn default() -> Self {
        Self {
            name: "ゴールドジムさいたまスーパーアリーナ".to_string(),
            extra_holidays: vec![],
            hours: HoursConfig::default(),
            closure: Some(ClosureConfig::default()),
        }
    }
}

impl GymConfig {
    /// 設定から営業状況の判定器を作る。
    pub fn evaluator(&self) -> Result<GymEvaluator<GymHolidays>> {
        let schedule = self.hours.schedule()?;
        let closure = self.closure.as_ref().map(ClosureConfig::policy).transpose()?;
        let holidays = ExtraHolidays::new(JapaneseHolidays, self.extra_holidays.iter().copied());
        Ok(GymEvaluator::new(schedule, closure, holidays))
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct HoursWindow {
    #[serde_as(as = "DisplayFromStr")]
    pub open: NaiveTime,
    #[serde_as(as = "DisplayFromStr")]
    pub close: NaiveTime,
}

impl HoursWindow {
    fn business_hours(&self) -> Result<BusinessHours> {
        Ok(BusinessHours::new(self.open, self.close)?)
    }
}

/// 曜日ごとの営業時間。曜日の指定がなければ `default` を使う。
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HoursConfig {
    pub default: HoursWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monday: Option<HoursWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tuesday: Option<HoursWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wednesday: Option<HoursWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thursday: Option<HoursWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friday: Option<HoursWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturday: Option<HoursWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sunday: Option<HoursWindow>,
}

impl Default for HoursConfig {
    fn default() -> Self {
        let schedule = WeeklySchedule::default();
        let window = |weekday| {
            let hours = schedule.hours_for(weekday);
            HoursWindow {
                open: hours.open(),
                close: hours.close(),
            }
        };
        Self {
            default: window(Weekday::Mon),
            monday: None,
            tuesday: None,
            wednesday: None,
            thursday: None,
            friday: None,
            saturday: None,
            sunday: Some(window(Weekday::Sun)),
        }
    }
}

impl HoursConfig {
    pub fn schedule(&self) -> Result<WeeklySchedule> {
        let overrides = [
            (Weekday::Mon, self.monday),
            (Weekday::Tue, self.tuesday),
            (Weekday::Wed, self.wednesday),
            (Weekday::Thu, self.thursday),
            (Weekday::Fri, self.friday),
            (Weekday::Sat, self.saturday),
            (Weekday::Sun, self.sunday),
        ];

        let mut schedule = WeeklySchedule::uniform(
            self.default
                .business_hours()
                .context("Invalid default business hours")?,
        );
        for (weekday, window) in overrides {
            if let Some(window) = window {
                let hours = window
                    .business_hours()
                    .with_context(|| format!("Invalid business hours for {weekday}"))?;
                schedule = schedule.with_day(weekday, hours);
            }
        }
        Ok(schedule)
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ClosureConfig {
    pub nth: u32,
    #[serde_as(as = "DisplayFromStr")]
    pub weekday: Weekday,
}

impl Default for ClosureConfig {
    fn default() -> Self {
        let policy = ClosurePolicy::default();
        Self {
            nth: policy.nth,
            weekday: policy.weekday,
        }
    }
}

impl ClosureConfig {
    fn policy(&self) -> Result<ClosurePolicy> {
        ensure!(
            (1..=5).contains(&self.nth),
            "closure.nth must be between 1 and 5, got {}",
            self.nth
        );
        Ok(ClosurePolicy {
            nth: self.nth,
            weekday: self.weekday,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CalendarConfig {
    /// Google Cloud Console からダウンロードした OAuth クライアントの JSON
    pub client_secret: PathBuf,
    /// 認可済みトークンのキャッシュ
    pub token_cache: PathBuf,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// 現在時刻から何日先までの予定を表示するか
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            client_secret: PathBuf::from("client_secret.json"),
            token_cache: PathBuf::from("token.json"),
            calendar_id: default_calendar_id(),
            window: default_window(),
            max_results: default_max_results(),
        }
    }
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_window() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_max_results() -> u32 {
    20
}

/// 予定を表示する期間の上限。
pub const MAX_CALENDAR_WINDOW: Duration = Duration::from_secs(5 * 366 * 24 * 60 * 60);

impl CalendarConfig {
    fn validate(&self) -> Result<()> {
        ensure!(
            !self.window.is_zero() && self.window <= MAX_CALENDAR_WINDOW,
            "calendar.window must be between 1s and {}, got {}",
            humantime::format_duration(MAX_CALENDAR_WINDOW),
            humantime::format_duration(self.window)
        );
        ensure!(self.max_results > 0, "calendar.max_results must be positive");
        Ok(())
    }
}

pub fn open_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).context("Failed to read configuration file")?;
    let config: Config = toml::from_str(&content).context("Failed to parse configuration file")?;
    if let Some(calendar) = &config.calendar {
        calendar.validate().context("Invalid calendar configuration")?;
    }
    Ok(config)
}

pub fn write_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    let config = Config {
        calendar: Some(CalendarConfig::default()),
        ..Default::default()
    };
    let content = toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
    fs::write(path.as_ref(), content).context("Failed to write configuration file")?;
    Ok(())
}

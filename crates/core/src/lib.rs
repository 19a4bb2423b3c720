//! 神アプリのドメインロジック。
//!
//! 日付の和暦・六曜・第N曜日表記と、ジムの営業状況判定を提供する。
//! どの関数も時刻を引数で受け取り、時計や外部サービスには依存しない。

pub mod gym;
pub mod holiday;
pub mod koyomi;

pub use gym::{
    BusinessHours, ClosurePolicy, ClosureReason, GymEvaluator, GymStatus, ScheduleError,
    WeeklySchedule,
};
pub use holiday::{ExtraHolidays, HolidayCalendar, JapaneseHolidays, NoHolidays};
pub use koyomi::{DateDisplayInfo, Era, Rokuyo, date_display_info};

use chrono::DateTime;
use chrono_tz::{Asia::Tokyo, Tz};

/// 現在の JST 日時を取得する。
pub fn now_jst() -> DateTime<Tz> {
    chrono::Utc::now().with_timezone(&Tokyo)
}

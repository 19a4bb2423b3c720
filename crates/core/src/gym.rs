//! ジムの営業状況判定。
//!
//! 曜日ごとの営業時間表と、任意の定休日ルール（第N X曜日、祝日の場合は営業）から
//! 指定時刻に営業中かどうかを判定する。

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, TimeZone, Timelike, Weekday};
use chrono_tz::Asia::Tokyo;
use thiserror::Error;

use crate::holiday::HolidayCalendar;
use crate::koyomi::{nth_of_month, weekday_kanji};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Closing time {close} must be later than opening time {open}")]
    EmptyWindow { open: NaiveTime, close: NaiveTime },
}

/// 1 日の営業時間 `[open, close)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessHours {
    open: NaiveTime,
    close: NaiveTime,
}

impl BusinessHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Result<Self, ScheduleError> {
        if close <= open {
            return Err(ScheduleError::EmptyWindow { open, close });
        }
        Ok(Self { open, close })
    }

    /// 既定の営業時間表用。正時のみ。
    fn from_hours(open: i64, close: i64) -> Self {
        Self {
            open: NaiveTime::MIN + TimeDelta::hours(open),
            close: NaiveTime::MIN + TimeDelta::hours(close),
        }
    }

    pub fn open(&self) -> NaiveTime {
        self.open
    }

    pub fn close(&self) -> NaiveTime {
        self.close
    }

    /// 時刻が営業時間内かどうか。秒以下は切り捨てて分単位で比較する。
    pub fn contains(&self, time: NaiveTime) -> bool {
        let minute_of_day = i64::from(time.hour() * 60 + time.minute()) * 60;
        let open = i64::from(self.open.num_seconds_from_midnight());
        let close = i64::from(self.close.num_seconds_from_midnight());
        open <= minute_of_day && minute_of_day < close
    }
}

impl fmt::Display for BusinessHours {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}〜{}",
            self.open.format("%H:%M"),
            self.close.format("%H:%M")
        )
    }
}

/// 曜日ごとの営業時間表。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    /// 月曜始まり
    days: [BusinessHours; 7],
}

impl WeeklySchedule {
    /// 全曜日同じ営業時間の表を作る。
    pub fn uniform(hours: BusinessHours) -> Self {
        Self { days: [hours; 7] }
    }

    /// 指定した曜日の営業時間を差し替える。
    pub fn with_day(mut self, weekday: Weekday, hours: BusinessHours) -> Self {
        self.days[weekday.num_days_from_monday() as usize] = hours;
        self
    }

    pub fn hours_for(&self, weekday: Weekday) -> BusinessHours {
        self.days[weekday.num_days_from_monday() as usize]
    }
}

impl Default for WeeklySchedule {
    /// 日曜 8:00〜21:00、それ以外 7:00〜23:00。
    fn default() -> Self {
        Self::uniform(BusinessHours::from_hours(7, 23))
            .with_day(Weekday::Sun, BusinessHours::from_hours(8, 21))
    }
}

/// 第N X曜日の定休日ルール。祝日に当たる場合は休まない。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosurePolicy {
    pub nth: u32,
    pub weekday: Weekday,
}

impl ClosurePolicy {
    /// ルールの対象日かどうか（祝日判定は含まない）。
    pub fn matches(&self, date: NaiveDate) -> bool {
        date.weekday() == self.weekday && nth_of_month(date) == self.nth
    }
}

impl Default for ClosurePolicy {
    /// 第3月曜日。
    fn default() -> Self {
        Self {
            nth: 3,
            weekday: Weekday::Mon,
        }
    }
}

/// 閉店の理由。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosureReason {
    /// 定休日
    RegularHoliday { nth: u32, weekday: Weekday },
}

impl fmt::Display for ClosureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosureReason::RegularHoliday { nth, weekday } => {
                write!(f, "休館日（第{nth}{}曜日）", weekday_kanji(*weekday))
            }
        }
    }
}

/// 営業状況。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GymStatus {
    Open,
    Closed { reason: Option<ClosureReason> },
}

impl GymStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, GymStatus::Open)
    }
}

impl fmt::Display for GymStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GymStatus::Open => f.write_str("🟢 営業中"),
            GymStatus::Closed { reason: None } => f.write_str("🔴 閉店中"),
            GymStatus::Closed {
                reason: Some(reason),
            } => write!(f, "🔴 {reason}"),
        }
    }
}

/// 営業状況の判定器。
///
/// 営業時間表・定休日ルール・祝日カレンダーはすべて外から与える。
#[derive(Debug, Clone)]
pub struct GymEvaluator<H> {
    schedule: WeeklySchedule,
    closure: Option<ClosurePolicy>,
    holidays: H,
}

impl<H: HolidayCalendar> GymEvaluator<H> {
    pub fn new(schedule: WeeklySchedule, closure: Option<ClosurePolicy>, holidays: H) -> Self {
        Self {
            schedule,
            closure,
            holidays,
        }
    }

    pub fn schedule(&self) -> &WeeklySchedule {
        &self.schedule
    }

    /// 指定時刻（JST に変換して評価）の営業状況を返す。
    pub fn status_at<Z: TimeZone>(&self, t: &DateTime<Z>) -> GymStatus {
        let t = t.with_timezone(&Tokyo);
        self.status_on(t.date_naive(), t.time())
    }

    /// 日付と時刻から営業状況を返す。
    ///
    /// 定休日ルールは営業時間表より先に評価され、該当すれば時刻に関わらず閉店とする。
    pub fn status_on(&self, date: NaiveDate, time: NaiveTime) -> GymStatus {
        if let Some(policy) = self.closure
            && policy.matches(date)
            && !self.holidays.is_holiday(date)
        {
            return GymStatus::Closed {
                reason: Some(ClosureReason::RegularHoliday {
                    nth: policy.nth,
                    weekday: policy.weekday,
                }),
            };
        }

        if self.schedule.hours_for(date.weekday()).contains(time) {
            GymStatus::Open
        } else {
            GymStatus::Closed { reason: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::holiday::{ExtraHolidays, JapaneseHolidays, NoHolidays};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn evaluator() -> GymEvaluator<NoHolidays> {
        GymEvaluator::new(WeeklySchedule::default(), None, NoHolidays)
    }

    #[test]
    fn sunday_hours() {
        let gym = evaluator();
        let sunday = date(2024, 1, 14);
        assert!(!gym.status_on(sunday, time(7, 59)).is_open());
        assert!(gym.status_on(sunday, time(8, 0)).is_open());
        assert!(gym.status_on(sunday, time(20, 59)).is_open());
        assert!(!gym.status_on(sunday, time(21, 0)).is_open());
    }

    #[test]
    fn weekday_hours() {
        let gym = evaluator();
        let tuesday = date(2024, 1, 16);
        assert!(!gym.status_on(tuesday, time(6, 59)).is_open());
        assert!(gym.status_on(tuesday, time(7, 0)).is_open());
        assert!(gym.status_on(tuesday, time(22, 59)).is_open());
        assert_eq!(
            gym.status_on(tuesday, time(23, 0)),
            GymStatus::Closed { reason: None }
        );
    }

    #[test]
    fn seconds_are_ignored() {
        let gym = evaluator();
        let tuesday = date(2024, 1, 16);
        let almost_closing = NaiveTime::from_hms_opt(22, 59, 59).unwrap();
        assert!(gym.status_on(tuesday, almost_closing).is_open());
    }

    #[test]
    fn third_monday_is_closed_all_day() {
        let gym = GymEvaluator::new(
            WeeklySchedule::default(),
            Some(ClosurePolicy::default()),
            JapaneseHolidays,
        );
        let third_monday = date(2024, 1, 15);
        for hour in [0, 7, 12, 22] {
            assert_eq!(
                gym.status_on(third_monday, time(hour, 0)),
                GymStatus::Closed {
                    reason: Some(ClosureReason::RegularHoliday {
                        nth: 3,
                        weekday: Weekday::Mon,
                    }),
                }
            );
        }
        // 第2月曜日は通常営業
        assert!(gym.status_on(date(2024, 1, 8), time(12, 0)).is_open());
    }

    #[test]
    fn third_monday_holiday_falls_through_to_hours() {
        let gym = GymEvaluator::new(
            WeeklySchedule::default(),
            Some(ClosurePolicy::default()),
            JapaneseHolidays,
        );
        // 2024-07-15 は海の日（第3月曜日）
        let marine_day = date(2024, 7, 15);
        assert!(gym.status_on(marine_day, time(10, 0)).is_open());
        assert_eq!(
            gym.status_on(marine_day, time(6, 0)),
            GymStatus::Closed { reason: None }
        );
    }

    #[test]
    fn extra_holiday_lifts_closure() {
        let third_monday = date(2024, 1, 15);
        let gym = GymEvaluator::new(
            WeeklySchedule::default(),
            Some(ClosurePolicy::default()),
            ExtraHolidays::new(NoHolidays, [third_monday]),
        );
        assert!(gym.status_on(third_monday, time(12, 0)).is_open());
    }

    #[test]
    fn without_policy_third_monday_is_open() {
        let gym = evaluator();
        assert!(gym.status_on(date(2024, 1, 15), time(12, 0)).is_open());
    }

    #[test]
    fn status_at_converts_to_jst() {
        let gym = evaluator();
        // 2024-01-13T22:30Z は JST 日曜 7:30
        let t = chrono::Utc.with_ymd_and_hms(2024, 1, 13, 22, 30, 0).unwrap();
        assert!(!gym.status_at(&t).is_open());
        let t = chrono::Utc.with_ymd_and_hms(2024, 1, 13, 23, 0, 0).unwrap();
        assert!(gym.status_at(&t).is_open());
    }

    #[test]
    fn business_hours_rejects_empty_window() {
        let err = BusinessHours::new(time(10, 0), time(10, 0)).unwrap_err();
        assert_eq!(
            err,
            ScheduleError::EmptyWindow {
                open: time(10, 0),
                close: time(10, 0),
            }
        );
    }

    #[test]
    fn custom_schedule() {
        let weekdays = BusinessHours::new(time(9, 30), time(18, 0)).unwrap();
        let saturday_hours = BusinessHours::new(time(10, 0), time(16, 0)).unwrap();
        let schedule = WeeklySchedule::uniform(weekdays).with_day(Weekday::Sat, saturday_hours);
        let gym = GymEvaluator::new(schedule, None, NoHolidays);
        let saturday = date(2024, 1, 13);
        assert!(!gym.status_on(saturday, time(9, 45)).is_open());
        assert!(gym.status_on(date(2024, 1, 12), time(9, 45)).is_open());
    }

    #[test]
    fn status_display() {
        assert_eq!(GymStatus::Open.to_string(), "🟢 営業中");
        assert_eq!(GymStatus::Closed { reason: None }.to_string(), "🔴 閉店中");
        assert_eq!(
            GymStatus::Closed {
                reason: Some(ClosureReason::RegularHoliday {
                    nth: 3,
                    weekday: Weekday::Mon,
                }),
            }
            .to_string(),
            "🔴 休館日（第3月曜日）"
        );
        assert_eq!(
            BusinessHours::new(time(7, 0), time(23, 0)).unwrap().to_string(),
            "07:00〜23:00"
        );
    }
}

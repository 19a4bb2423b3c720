//! 祝日判定。
//!
//! 営業時間の判定に使う祝日カレンダーを差し替えられるよう trait として定義し、
//! 日本の「国民の祝日に関する法律」に基づく実装を提供する。

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};

use crate::koyomi::nth_of_month;

/// 祝日カレンダー。
pub trait HolidayCalendar {
    /// 指定日が祝日（休日）かどうか。
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

impl<T: HolidayCalendar + ?Sized> HolidayCalendar for &T {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        (**self).is_holiday(date)
    }
}

/// 祝日を持たないカレンダー。
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHolidays;

impl HolidayCalendar for NoHolidays {
    fn is_holiday(&self, _date: NaiveDate) -> bool {
        false
    }
}

/// 既存のカレンダーに任意の休日を追加する。
#[derive(Debug, Clone, Default)]
pub struct ExtraHolidays<C> {
    inner: C,
    dates: BTreeSet<NaiveDate>,
}

impl<C: HolidayCalendar> ExtraHolidays<C> {
    pub fn new(inner: C, dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            inner,
            dates: dates.into_iter().collect(),
        }
    }
}

impl<C: HolidayCalendar> HolidayCalendar for ExtraHolidays<C> {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date) || self.inner.is_holiday(date)
    }
}

/// 日本の祝日。
///
/// 2000〜2099 年の範囲で、振替休日と国民の休日を含めて判定する。
/// 範囲外の年は常に祝日ではないものとして扱う。
#[derive(Debug, Clone, Copy, Default)]
pub struct JapaneseHolidays;

impl JapaneseHolidays {
    pub const FIRST_YEAR: i32 = 2000;
    pub const LAST_YEAR: i32 = 2099;

    /// 祝日名を返す。祝日でなければ `None`。
    pub fn holiday_name(&self, date: NaiveDate) -> Option<&'static str> {
        if !(Self::FIRST_YEAR..=Self::LAST_YEAR).contains(&date.year()) {
            return None;
        }
        if let Some(name) = national_holiday(date) {
            return Some(name);
        }
        if is_substitute_holiday(date) {
            return Some("振替休日");
        }
        if is_citizens_holiday(date) {
            return Some("国民の休日");
        }
        None
    }
}

impl HolidayCalendar for JapaneseHolidays {
    fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holiday_name(date).is_some()
    }
}

/// 法律で日付が定められた祝日（振替休日・国民の休日を除く）。
fn national_holiday(date: NaiveDate) -> Option<&'static str> {
    let year = date.year();
    let month = date.month();
    let day = date.day();

    // 東京オリンピック・パラリンピックに伴う移動
    match (year, month, day) {
        (2020, 7, 23) | (2021, 7, 22) => return Some("海の日"),
        (2020, 7, 24) | (2021, 7, 23) => return Some("スポーツの日"),
        (2020, 8, 10) | (2021, 8, 8) => return Some("山の日"),
        (2019, 5, 1) => return Some("天皇の即位の日"),
        (2019, 4, 30) | (2019, 5, 2) => return Some("国民の休日"),
        (2019, 10, 22) => return Some("即位礼正殿の儀の行われる日"),
        _ => {}
    }
    let olympic_year = year == 2020 || year == 2021;

    let fixed = match (month, day) {
        (1, 1) => Some("元日"),
        (2, 11) => Some("建国記念の日"),
        (2, 23) if year >= 2020 => Some("天皇誕生日"),
        (4, 29) if year >= 2007 => Some("昭和の日"),
        (4, 29) => Some("みどりの日"),
        (5, 3) => Some("憲法記念日"),
        (5, 4) if year >= 2007 => Some("みどりの日"),
        (5, 5) => Some("こどもの日"),
        (7, 20) if year < 2003 => Some("海の日"),
        (8, 11) if year >= 2016 && !olympic_year => Some("山の日"),
        (9, 15) if year < 2003 => Some("敬老の日"),
        (11, 3) => Some("文化の日"),
        (11, 23) => Some("勤労感謝の日"),
        (12, 23) if year <= 2018 => Some("天皇誕生日"),
        _ => None,
    };
    if fixed.is_some() {
        return fixed;
    }

    if month == 3 && day == vernal_equinox_day(year) {
        return Some("春分の日");
    }
    if month == 9 && day == autumnal_equinox_day(year) {
        return Some("秋分の日");
    }

    // ハッピーマンデー
    if date.weekday() == Weekday::Mon {
        match (month, nth_of_month(date)) {
            (1, 2) => return Some("成人の日"),
            (7, 3) if year >= 2003 && !olympic_year => return Some("海の日"),
            (9, 3) if year >= 2003 => return Some("敬老の日"),
            (10, 2) if !olympic_year => {
                return Some(if year >= 2020 {
                    "スポーツの日"
                } else {
                    "体育の日"
                });
            }
            _ => {}
        }
    }

    None
}

/// 祝日が日曜日に当たったときの振替休日。
///
/// 2007 年以降は日曜の祝日から続く祝日の連なりが終わった最初の平日、
/// それより前は日曜の祝日の翌月曜日のみ。
fn is_substitute_holiday(date: NaiveDate) -> bool {
    if national_holiday(date).is_some() {
        return false;
    }

    if date.year() < 2007 {
        return date.weekday() == Weekday::Mon
            && date
                .pred_opt()
                .is_some_and(|prev| national_holiday(prev).is_some());
    }

    let mut cursor = date.pred_opt();
    while let Some(prev) = cursor {
        if national_holiday(prev).is_none() {
            return false;
        }
        if prev.weekday() == Weekday::Sun {
            return true;
        }
        cursor = prev.pred_opt();
    }
    false
}

/// 前日と翌日が祝日に挟まれた平日（国民の休日）。
fn is_citizens_holiday(date: NaiveDate) -> bool {
    if date.weekday() == Weekday::Sun || national_holiday(date).is_some() {
        return false;
    }
    let is_national = |d: Option<NaiveDate>| d.and_then(national_holiday).is_some();
    is_national(date.pred_opt()) && is_national(date.succ_opt())
}

/// 春分日（1980〜2099 年の近似式）。
fn vernal_equinox_day(year: i32) -> u32 {
    equinox_day(20.8431, year)
}

/// 秋分日（1980〜2099 年の近似式）。
fn autumnal_equinox_day(year: i32) -> u32 {
    equinox_day(23.2488, year)
}

fn equinox_day(base: f64, year: i32) -> u32 {
    let elapsed = year - 1980;
    (base + 0.242194 * f64::from(elapsed) - f64::from(elapsed.div_euclid(4))).floor() as u32
}

//! 日時を表示用の暦情報（西暦・和暦・六曜・第N曜日）に変換する。

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Weekday};
use chrono_tz::Asia::Tokyo;
use serde::Serialize;

/// 六曜の起点 1900-01-01 00:00 JST の UNIX 時刻（秒）。
const ROKUYO_EPOCH: i64 = -2_209_021_200;

const SECONDS_PER_DAY: i64 = 86_400;

/// 月曜始まりの曜日表記。
const WEEKDAY_KANJI: [&str; 7] = ["月", "火", "水", "木", "金", "土", "日"];

/// 表示用の暦情報。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateDisplayInfo {
    /// 西暦 (YYYY年MM月DD日)
    pub gregorian: String,
    /// 和暦 (例: 令和6年1月15日)
    pub wareki: String,
    /// 時刻 (HH:MM)
    pub time: String,
    /// 六曜
    pub rokuyo: String,
    /// 第N曜日 (例: 第3月曜日)
    pub nth_weekday: String,
}

/// 日時から表示用の暦情報を生成する。
///
/// 引数のタイムゾーンに関わらず JST に変換してから計算する。
pub fn date_display_info<Z: TimeZone>(t: &DateTime<Z>) -> DateDisplayInfo {
    let t = t.with_timezone(&Tokyo);
    let date = t.date_naive();

    DateDisplayInfo {
        gregorian: t.format("%Y年%m月%d日").to_string(),
        wareki: to_wareki(date),
        time: t.format("%H:%M").to_string(),
        rokuyo: rokuyo(&t).to_string(),
        nth_weekday: nth_weekday_label(date),
    }
}

/// 元号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era {
    Reiwa,
    Heisei,
    Showa,
    /// 昭和より前
    Unknown,
}

impl Era {
    /// 西暦年から元号と元号年を求める。
    ///
    /// 改元日は各年の 1 月 1 日として扱う。昭和より前は `Unknown` と元号年 0 を返す。
    pub fn from_year(year: i32) -> (Era, i32) {
        if year >= 2019 {
            (Era::Reiwa, year - 2018)
        } else if year >= 1989 {
            (Era::Heisei, year - 1988)
        } else if year >= 1926 {
            (Era::Showa, year - 1925)
        } else {
            (Era::Unknown, 0)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Era::Reiwa => "令和",
            Era::Heisei => "平成",
            Era::Showa => "昭和",
            Era::Unknown => "不明",
        }
    }
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 日付を和暦表記にする。月日はゼロ埋めしない。
pub fn to_wareki(date: NaiveDate) -> String {
    let (era, era_year) = Era::from_year(date.year());
    format!("{era}{era_year}年{}月{}日", date.month(), date.day())
}

/// 六曜。並び順がそのまま周期の順序になる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rokuyo {
    Sensho,
    Tomobiki,
    Senbu,
    Butsumetsu,
    Taian,
    Shakko,
}

impl Rokuyo {
    const CYCLE: [Rokuyo; 6] = [
        Rokuyo::Sensho,
        Rokuyo::Tomobiki,
        Rokuyo::Senbu,
        Rokuyo::Butsumetsu,
        Rokuyo::Taian,
        Rokuyo::Shakko,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rokuyo::Sensho => "先勝",
            Rokuyo::Tomobiki => "友引",
            Rokuyo::Senbu => "先負",
            Rokuyo::Butsumetsu => "仏滅",
            Rokuyo::Taian => "大安",
            Rokuyo::Shakko => "赤口",
        }
    }
}

impl fmt::Display for Rokuyo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 1900-01-01 00:00 JST からの経過日数で六曜を求める。
///
/// 経過日数は負の無限大方向に切り捨てるため、起点より前の時刻でも周期が崩れない。
pub fn rokuyo<Z: TimeZone>(t: &DateTime<Z>) -> Rokuyo {
    let days = (t.timestamp() - ROKUYO_EPOCH).div_euclid(SECONDS_PER_DAY);
    Rokuyo::CYCLE[days.rem_euclid(6) as usize]
}

/// その曜日が月の中で何回目かを返す（1〜5）。
pub fn nth_of_month(date: NaiveDate) -> u32 {
    (date.day() - 1) / 7 + 1
}

/// 曜日の漢字一文字表記。
pub fn weekday_kanji(weekday: Weekday) -> &'static str {
    WEEKDAY_KANJI[weekday.num_days_from_monday() as usize]
}

/// `第3月曜日` 形式のラベルを返す。
pub fn nth_weekday_label(date: NaiveDate) -> String {
    format!(
        "第{}{}曜日",
        nth_of_month(date),
        weekday_kanji(date.weekday())
    )
}

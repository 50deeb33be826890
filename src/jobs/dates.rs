//! 日期解析：请求日期（today / yesterday / yyyy-MM-dd）与 dev.bg 发布日期（"10 яну."）
//!
//! 两者都刻意宽松：无法识别的请求日期回退为今天；发布日期只有「日 月」，年份取当前年。

use chrono::{Datelike, Days, NaiveDate};

const ISO_FORMAT: &str = "%Y-%m-%d";

/// dev.bg 使用的保加利亚语月份缩写（固定 12 项，按页面原文）
const BG_MONTHS: [(&str, u32); 12] = [
    ("яну.", 1),
    ("февруари", 2),
    ("март", 3),
    ("април", 4),
    ("май", 5),
    ("юни", 6),
    ("юли", 7),
    ("август", 8),
    ("септември", 9),
    ("октомври", 10),
    ("ноември", 11),
    ("дек.", 12),
];

/// 解析请求日期；`today` 为调用时刻的本地日期
pub fn parse_target_date(input: &str, today: NaiveDate) -> NaiveDate {
    let normalized = input.trim().to_lowercase();
    match normalized.as_str() {
        "today" => today,
        "yesterday" => today.checked_sub_days(Days::new(1)).unwrap_or(today),
        other => NaiveDate::parse_from_str(other, ISO_FORMAT).unwrap_or(today),
    }
}

/// 解析列表项上的发布日期文本，如 "10 яну."；格式不符返回 None
pub fn parse_posted_date(text: &str, current_year: i32) -> Option<NaiveDate> {
    let lowered = text.to_lowercase();
    let parts: Vec<&str> = lowered.split(' ').filter(|p| !p.is_empty()).collect();
    let [day, month] = parts.as_slice() else {
        return None;
    };
    let day: u32 = day.parse().ok()?;
    let month = BG_MONTHS
        .iter()
        .find(|(name, _)| name == month)
        .map(|(_, m)| *m)?;
    NaiveDate::from_ymd_opt(current_year, month, day)
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(ISO_FORMAT).to_string()
}

/// 发布日期是否与目标日期同一天；年份按调用当天所在年补全
pub fn is_posted_on(posted_text: &str, target: NaiveDate, today: NaiveDate) -> bool {
    parse_posted_date(posted_text, today.year()).is_some_and(|d| d == target)
}

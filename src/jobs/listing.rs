//! dev.bg 列表页解析
//!
//! 每页中 `div[class^=job-list-item]` 为一条职位；标题、公司、日期、链接按 CSS 选择器提取。
//! 单条解析异常只跳过该条，不影响整页。

use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};

use crate::jobs::dates::is_posted_on;
use crate::jobs::JobSearchError;

const TITLE_FALLBACK: &str = "Title not found";
const COMPANY_FALLBACK: &str = "Company not specified";

/// 一条匹配目标日期的职位
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobListing {
    pub title: String,
    pub company: String,
    pub date_posted: String,
    pub link: String,
}

/// 页面上提取的原始条目（尚未按日期过滤）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawListing {
    pub title: String,
    pub company: String,
    pub date_text: String,
    pub href: String,
}

impl RawListing {
    /// 日期匹配时转为 JobListing；日期无法解析或不同日返回 None
    pub fn into_listing(
        self,
        base_url: &str,
        target: NaiveDate,
        today: NaiveDate,
    ) -> Option<JobListing> {
        if !is_posted_on(&self.date_text, target, today) {
            return None;
        }
        let link = normalize_link(base_url, &self.href);
        Some(JobListing {
            title: non_empty_or(self.title, TITLE_FALLBACK),
            company: non_empty_or(self.company, COMPANY_FALLBACK),
            date_posted: self.date_text,
            link,
        })
    }
}

/// 预编译的选择器，一个客户端复用一份
pub struct ListingSelectors {
    item: Selector,
    title: Selector,
    company: Selector,
    date: Selector,
    link: Selector,
}

impl ListingSelectors {
    pub fn new() -> Result<Self, JobSearchError> {
        Ok(Self {
            item: compile(r#"div[class^="job-list-item"]"#)?,
            title: compile(r#"h6[class*="job-title"]"#)?,
            company: compile(r#"[class*="company"], [class*="employer"]"#)?,
            date: compile("span.date")?,
            link: compile("a[href]")?,
        })
    }

    /// 解析一页 HTML，返回页面中全部职位条目；空 Vec 表示已无更多页
    pub fn parse_page(&self, html: &str) -> Vec<RawListing> {
        let document = Html::parse_document(html);
        document
            .select(&self.item)
            .map(|item| RawListing {
                title: joined_text(item, &self.title),
                company: joined_text(item, &self.company),
                date_text: joined_text(item, &self.date),
                href: item
                    .select(&self.link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            })
            .collect()
    }
}

fn compile(css: &str) -> Result<Selector, JobSearchError> {
    Selector::parse(css).map_err(|e| JobSearchError::Selector(format!("{css}: {e}")))
}

/// 所有匹配元素的文本，空白折叠后以单个空格连接
fn joined_text(root: ElementRef<'_>, selector: &Selector) -> String {
    root.select(selector)
        .flat_map(|el| el.text())
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize_link(base_url: &str, href: &str) -> String {
    if href.is_empty() || href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", base_url.trim_end_matches('/'), href)
    }
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

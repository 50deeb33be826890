//! dev.bg 职位检索：分类映射、日期解析、列表页解析、分页抓取

pub mod category;
pub mod client;
pub mod dates;
pub mod listing;

use thiserror::Error;

pub use category::category_slug;
pub use client::{render_results, HttpPageSource, JobBoard, PageSource};
pub use dates::{format_date, parse_posted_date, parse_target_date};
pub use listing::{JobListing, ListingSelectors, RawListing};

/// 检索失败：无法构造合法 URL，或底层请求/解析出错
#[derive(Error, Debug)]
pub enum JobSearchError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Page is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("Invalid selector: {0}")]
    Selector(String),
}

//! dev.bg 职位检索客户端
//!
//! 按分类逐页 GET `{base}/company/jobs/{slug}?_paged={n}`（最多 max_pages 页），
//! 某页没有任何职位元素即提前停止；只保留发布日期与目标日期同一天的条目。
//! 非 UTF-8 的页面跳过；设置了总时限时，到期即停止翻页并返回已收集的条目。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use reqwest::{Client, Url};
use tokio::time::Instant;

use crate::config::JobSearchSection;
use crate::jobs::category::category_slug;
use crate::jobs::dates::{format_date, parse_target_date};
use crate::jobs::listing::{JobListing, ListingSelectors};
use crate::jobs::JobSearchError;

/// 页面来源：给定 URL 返回 HTML（HTTP 实现或测试用的内存实现）
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, JobSearchError>;
}

/// 基于 reqwest 的页面来源：固定移动端 UA 与超时
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self, JobSearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch(&self, url: &Url) -> Result<String, JobSearchError> {
        let resp = self.client.get(url.clone()).send().await?;
        if !resp.status().is_success() {
            // 非 2xx 页面照常解析：通常不含职位元素，分页自然结束
            tracing::debug!(url = %url, status = %resp.status(), "job board returned non-success status");
        }
        let body = resp.bytes().await?;
        decode_page(url, &body)
    }
}

/// 页面正文按 UTF-8 严格解码；失败返回 Encoding，由翻页逻辑跳过该页
fn decode_page(url: &Url, body: &[u8]) -> Result<String, JobSearchError> {
    std::str::from_utf8(body)
        .map(str::to_owned)
        .map_err(|_| JobSearchError::Encoding(url.to_string()))
}

/// 职位检索：持有页面来源与预编译选择器
pub struct JobBoard {
    source: Arc<dyn PageSource>,
    base_url: String,
    max_pages: u32,
    /// 整次翻页的总时限
    deadline: Option<Duration>,
    selectors: ListingSelectors,
}

impl JobBoard {
    pub fn new(
        source: Arc<dyn PageSource>,
        base_url: impl Into<String>,
        max_pages: u32,
    ) -> Result<Self, JobSearchError> {
        Ok(Self {
            source,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_pages,
            deadline: None,
            selectors: ListingSelectors::new()?,
        })
    }

    /// 设置翻页总时限：到期后不再请求新页面，返回已收集的条目
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// 按配置构建（HTTP 来源）
    pub fn from_config(cfg: &JobSearchSection) -> Result<Self, JobSearchError> {
        let source = HttpPageSource::new(&cfg.user_agent, cfg.timeout_secs)?;
        Self::new(Arc::new(source), cfg.base_url.clone(), cfg.max_pages)
    }

    /// 检索并渲染为工具结果文本；日期相对调用时刻的本地日期解析
    pub async fn search(&self, category: &str, date: &str) -> Result<String, JobSearchError> {
        self.search_on(category, date, Local::now().date_naive()).await
    }

    /// 同 search，但显式给定「今天」
    pub async fn search_on(
        &self,
        category: &str,
        date: &str,
        today: NaiveDate,
    ) -> Result<String, JobSearchError> {
        let category = category.trim();
        if category.is_empty() {
            return Ok("Missing job category. Please provide a category.".to_string());
        }
        let target = parse_target_date(date, today);
        let jobs = self.fetch_jobs(category, target, today).await?;
        Ok(render_results(category, target, &jobs))
    }

    pub async fn fetch_jobs(
        &self,
        category: &str,
        target: NaiveDate,
        today: NaiveDate,
    ) -> Result<Vec<JobListing>, JobSearchError> {
        let slug = category_slug(category);
        if slug.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let mut listings = Vec::new();
        for page in 1..=self.max_pages {
            let url = self.page_url(&slug, page)?;
            let fetched = match self.deadline {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    match tokio::time::timeout(remaining, self.source.fetch(&url)).await {
                        Ok(fetched) => fetched,
                        Err(_) => {
                            tracing::warn!(
                                url = %url,
                                collected = listings.len(),
                                "job board deadline reached, returning partial results"
                            );
                            break;
                        }
                    }
                }
                None => self.source.fetch(&url).await,
            };
            let html = match fetched {
                Ok(html) => html,
                Err(JobSearchError::Encoding(_)) => {
                    tracing::warn!(url = %url, "skipping job board page that is not valid UTF-8");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let items = self.selectors.parse_page(&html);
            tracing::debug!(url = %url, items = items.len(), "job board page");
            if items.is_empty() {
                break;
            }
            listings.extend(
                items
                    .into_iter()
                    .filter_map(|raw| raw.into_listing(&self.base_url, target, today)),
            );
        }
        Ok(listings)
    }

    fn page_url(&self, slug: &str, page: u32) -> Result<Url, JobSearchError> {
        let raw = format!("{}/company/jobs/{}?_paged={}", self.base_url, slug, page);
        Url::parse(&raw).map_err(|_| JobSearchError::InvalidUrl(raw))
    }
}

/// 渲染检索结果（工具返回给模型的文本）
pub fn render_results(category: &str, target: NaiveDate, jobs: &[JobListing]) -> String {
    let date = format_date(target);
    if jobs.is_empty() {
        return format!("No jobs found for category '{category}' on {date} on dev.bg");
    }

    let mut out = format!(
        "Found {} jobs in '{}' category for {}:\n\n",
        jobs.len(),
        category,
        date
    );
    for (i, job) in jobs.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, job.title));
        out.push_str(&format!("   Company: {}\n", job.company));
        out.push_str(&format!("   Posted: {}\n", job.date_posted));
        if !job.link.is_empty() {
            out.push_str(&format!("   Link: {}\n", job.link));
        }
        out.push('\n');
    }
    out
}

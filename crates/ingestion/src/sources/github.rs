//! Curated job lists kept in GitHub READMEs
//!
//! The README is fetched through the contents API, decoded from Base64
//! and cut down to the section under the configured heading. Inside that
//! section every bullet (or table row) is one posting:
//!
//! ```text
//! ## Jobs
//! ### 2025-01-15
//! - Acme Robotics | [Perception Engineer](https://acme.example/jobs/1) | Shanghai | Full-time
//! - 2025-01-14 | Beta Labs | Research Intern | Beijing | Intern
//! ```
//!
//! A leading date on the line wins over the enclosing date heading.
//! Lines with neither are dropped.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::NaiveDate;
use regex_lite::Regex;
use reqwest::Client;
use robodigest_common::config::{GithubRepoConfig, GithubSourceConfig, RateLimitPolicy};
use robodigest_common::records::JobPosting;
use robodigest_common::{CanonicalRecord, SourceKind};
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, instrument, warn};

use super::{unexpected_unit, FetchContext, SourceAdapter, UnitTarget, WorkUnit};
use crate::errors::FetchError;
use crate::http::send_json;
use crate::ratelimit::RateLimiter;

const PROVIDER: &str = "github";

#[derive(Debug, Deserialize)]
struct ReadmeResponse {
    content: String,
    #[serde(default)]
    encoding: String,
}

pub struct GithubReadmeAdapter {
    client: Client,
    config: GithubSourceConfig,
    token: Option<String>,
    limiter: RateLimiter,
}

impl GithubReadmeAdapter {
    pub fn new(client: Client, config: GithubSourceConfig, token: Option<String>, policy: RateLimitPolicy) -> Self {
        Self {
            client,
            config,
            token,
            limiter: RateLimiter::new(PROVIDER, policy),
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    async fn fetch_readme(&self, ctx: &FetchContext, repo: &GithubRepoConfig) -> Result<String, FetchError> {
        let url = format!(
            "{}/repos/{}/{}/readme",
            self.config.base_url.trim_end_matches('/'),
            repo.owner,
            repo.repo
        );
        let response: ReadmeResponse = self
            .limiter
            .run(&ctx.cancel, || {
                let mut request = self
                    .client
                    .get(&url)
                    .header("Accept", "application/vnd.github+json");
                if let Some(token) = &self.token {
                    request = request.bearer_auth(token);
                }
                send_json(PROVIDER, request)
            })
            .await?;

        if !response.encoding.is_empty() && response.encoding != "base64" {
            return Err(FetchError::malformed(
                PROVIDER,
                format!("unsupported encoding {}", response.encoding),
                &response.content,
            ));
        }
        decode_content(&response.content)
    }
}

#[async_trait]
impl SourceAdapter for GithubReadmeAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Jobs
    }

    fn work_units(&self, _ctx: &FetchContext) -> Vec<WorkUnit> {
        self.config.repos.iter().cloned().map(WorkUnit::repo).collect()
    }

    #[instrument(skip(self, ctx), fields(source = PROVIDER, unit = %unit.key))]
    async fn fetch(&self, ctx: &FetchContext, unit: &WorkUnit) -> Result<Vec<CanonicalRecord>, FetchError> {
        let UnitTarget::Repo(repo) = &unit.target else {
            return Err(unexpected_unit(PROVIDER, unit));
        };
        let heading = Regex::new(&repo.heading_pattern)
            .map_err(|e| FetchError::Config(format!("invalid heading pattern for {}: {e}", unit.key)))?;

        let markdown = self.fetch_readme(ctx, repo).await?;
        let Some(section) = extract_section(&markdown, &heading) else {
            warn!(repo = %unit.key, "No job section in README");
            return Ok(Vec::new());
        };

        let jobs = parse_jobs(&section);
        debug!(repo = %unit.key, jobs = jobs.len(), "Job list parsed");
        Ok(jobs.into_iter().map(CanonicalRecord::Job).collect())
    }
}

fn decode_content(content: &str) -> Result<String, FetchError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| FetchError::malformed(PROVIDER, format!("base64: {e}"), content))?;
    String::from_utf8(bytes).map_err(|e| FetchError::malformed(PROVIDER, format!("utf-8: {e}"), content))
}

/// Heading depth of a markdown line, `None` for non-headings
fn heading_level(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    let rest = &trimmed[level..];
    (1..=6).contains(&level).then_some(level).filter(|_| rest.is_empty() || rest.starts_with(' '))
}

/// Lines under the first heading matching `heading`, up to the next
/// heading of the same or a shallower level
pub fn extract_section(markdown: &str, heading: &Regex) -> Option<String> {
    let mut lines = markdown.lines();
    let level = lines.by_ref().find_map(|line| {
        heading_level(line).filter(|_| heading.is_match(line.trim()))
    })?;

    let body: Vec<&str> = lines
        .take_while(|line| heading_level(line).map_or(true, |l| l > level))
        .collect();
    Some(body.join("\n"))
}

fn date_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(\d{4})\s*[-/.年]\s*(\d{1,2})\s*[-/.月]\s*(\d{1,2})").ok())
        .as_ref()
}

fn link_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").ok())
        .as_ref()
}

/// Normalize `2025/1/5`, `2025.01.05` or `2025年1月5日` to `2025-01-05`
pub fn normalize_date(text: &str) -> Option<String> {
    let caps = date_pattern()?.captures(text)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string())
}

/// Strip emphasis and bracket decoration around a plain cell
fn clean_cell(cell: &str) -> String {
    cell.trim()
        .trim_matches(|c: char| matches!(c, '*' | '_' | '`' | '[' | ']'))
        .trim()
        .to_string()
}

/// `[text](url)` split into its parts, or the cleaned cell with no link
fn split_link(cell: &str) -> (String, Option<String>) {
    match link_pattern().and_then(|p| p.captures(cell)) {
        Some(caps) => {
            let text = caps.get(1).map(|m| clean_cell(m.as_str())).unwrap_or_default();
            let url = caps.get(2).map(|m| m.as_str().to_string());
            (text, url)
        }
        None => (clean_cell(cell), None),
    }
}

/// The `|---|:---:|` row under a table header
fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.chars().all(|c| matches!(c, '-' | ':' | '|' | ' '))
}

fn list_item(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
        return Some(rest);
    }
    if is_separator_row(trimmed) {
        return None;
    }
    let row = trimmed.strip_prefix('|')?;
    Some(row.strip_suffix('|').unwrap_or(row))
}

/// Parse the dated entries of a job section
pub fn parse_jobs(section: &str) -> Vec<JobPosting> {
    let mut current_date: Option<String> = None;
    let mut jobs = Vec::new();

    let mut lines = section.lines().peekable();
    while let Some(line) = lines.next() {
        if heading_level(line).is_some() {
            current_date = normalize_date(line);
            continue;
        }
        // Column names sit directly above the separator row
        if line.trim_start().starts_with('|') && lines.peek().is_some_and(|next| is_separator_row(next)) {
            continue;
        }
        let Some(item) = list_item(line) else {
            continue;
        };

        let mut cells: Vec<&str> = item.split('|').map(str::trim).filter(|c| !c.is_empty()).collect();
        let leading_date = cells.first().and_then(|c| normalize_date(c));
        if leading_date.is_some() {
            cells.remove(0);
        }
        let Some(date) = leading_date.or_else(|| current_date.clone()) else {
            debug!(line, "Job line without a date");
            continue;
        };

        let job = match cells.as_slice() {
            [] => None,
            [title] => build_job(None, title, &[], &date),
            [company, title, rest @ ..] => build_job(Some(*company), title, rest, &date),
        };
        match job {
            Some(job) => jobs.push(job),
            None => debug!(line, "Job line without a title"),
        }
    }
    jobs
}

fn build_job(company: Option<&str>, title: &str, rest: &[&str], date: &str) -> Option<JobPosting> {
    let (title, mut link) = split_link(title);
    if title.is_empty() {
        return None;
    }

    let mut job = JobPosting::new(title, date);
    job.company = company.map(|c| {
        let (name, company_link) = split_link(c);
        link = link.take().or(company_link);
        name
    });
    job.company = job.company.filter(|c| !c.is_empty());
    job.location = rest.first().map(|c| clean_cell(c)).filter(|c| !c.is_empty());
    job.job_type = rest.get(1).map(|c| clean_cell(c)).filter(|c| !c.is_empty());
    if rest.len() > 2 {
        let description = rest[2..].iter().map(|c| clean_cell(c)).collect::<Vec<_>>().join(" | ");
        job.description = Some(description).filter(|d| !d.is_empty());
    }
    job.link = link;
    Some(job)
}

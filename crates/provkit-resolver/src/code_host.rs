use std::collections::HashSet;

use anyhow::{Context, Result};
use provkit_core::CodeHostConfig;
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeHostHit {
    pub full_name: String,
    pub html_url: String,
}

pub trait CodeHostSearch {
    /// Distinct hits in API order. Transport or parse failures truncate the
    /// list instead of failing.
    fn search_code_host(&self, query: &str) -> Vec<CodeHostHit>;
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    full_name: Option<String>,
    html_url: Option<String>,
}

/// Repository search against a GitHub-compatible API.
pub struct CodeHostClient {
    config: CodeHostConfig,
    client: Option<Client>,
}

impl CodeHostClient {
    pub fn new(config: CodeHostConfig) -> Self {
        let client = Client::builder()
            .user_agent(concat!("provkit/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build();
        let client = match client {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!("code-host search disabled: failed to build HTTP client: {err}");
                None
            }
        };
        Self { config, client }
    }

    fn fetch_page(&self, client: &Client, query: &str, page: u32) -> Result<Vec<CodeHostHit>> {
        let per_page = self.config.per_page.to_string();
        let page_number = page.to_string();
        let mut request = client
            .get(&self.config.endpoint)
            .header(ACCEPT, "application/vnd.github+json")
            .query(&[
                ("q", query),
                ("per_page", per_page.as_str()),
                ("page", page_number.as_str()),
            ]);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let body = request
            .send()
            .with_context(|| format!("code-host search request failed (page {page})"))?
            .error_for_status()
            .with_context(|| format!("code-host search rejected (page {page})"))?
            .text()
            .with_context(|| format!("code-host search body unreadable (page {page})"))?;
        parse_search_page(&body)
    }
}

impl CodeHostSearch for CodeHostClient {
    fn search_code_host(&self, query: &str) -> Vec<CodeHostHit> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        collect_pages(self.config.per_page, self.config.limit, |page| {
            self.fetch_page(client, query, page)
        })
    }
}

/// Requests pages from 1 upward until `limit` hits are collected or a page
/// comes back short. The first failing page ends the search with whatever was
/// gathered so far.
pub fn collect_pages<F>(per_page: u32, limit: usize, mut fetch_page: F) -> Vec<CodeHostHit>
where
    F: FnMut(u32) -> Result<Vec<CodeHostHit>>,
{
    let per_page = per_page.max(1) as usize;
    let mut seen = HashSet::new();
    let mut hits = Vec::new();
    let mut page = 1_u32;

    while hits.len() < limit {
        let items = match fetch_page(page) {
            Ok(items) => items,
            Err(err) => {
                tracing::debug!("code-host search stopped at page {page}: {err:#}");
                break;
            }
        };
        let page_len = items.len();
        for hit in items {
            if hits.len() >= limit {
                break;
            }
            if seen.insert(hit.full_name.clone()) {
                hits.push(hit);
            }
        }
        if page_len < per_page {
            break;
        }
        page += 1;
    }

    hits
}

/// Extracts `items[].full_name` / `items[].html_url`; items missing either
/// field are dropped.
pub fn parse_search_page(body: &str) -> Result<Vec<CodeHostHit>> {
    let page: SearchPage =
        serde_json::from_str(body).context("code-host search returned malformed JSON")?;
    Ok(page
        .items
        .into_iter()
        .filter_map(|item| match (item.full_name, item.html_url) {
            (Some(full_name), Some(html_url)) => Some(CodeHostHit {
                full_name,
                html_url,
            }),
            _ => None,
        })
        .collect())
}

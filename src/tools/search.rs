//! Web search and scraping.
//!
//! `SearchProvider` is the seam for search backends; the bundled
//! implementation queries the DuckDuckGo JSON API and scrapes each hit's
//! page into plain text. Providers may return fewer hits than requested.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use crate::core::config::SearchConfig;
use crate::core::errors::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
    /// Plain text scraped from the hit's page; empty when scraping failed.
    pub raw_text: String,
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a search and scrape each result's page text.
    async fn search_and_scrape(&self, query: &str) -> Result<Vec<SearchHit>, ApiError>;
}

pub struct DuckDuckGoSearch {
    client: Client,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new(config: &SearchConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.scrape_timeout_secs))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) Chrome/120.0 Safari/537.36")
            .build()
            .unwrap_or_default();

        Self {
            client,
            max_results: config.max_results,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<(String, String, String)>, ApiError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_redirect=1&no_html=1",
            urlencoding::encode(query)
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::unavailable(format!("search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ApiError::Unavailable(format!(
                "search failed: {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await.map_err(ApiError::internal)?;
        let mut results = Vec::new();

        if let Some(abstract_text) = payload.get("AbstractText").and_then(|v| v.as_str()) {
            if let Some(url) = payload.get("AbstractURL").and_then(|v| v.as_str()) {
                if !abstract_text.is_empty() && !url.is_empty() {
                    results.push((
                        abstract_text
                            .split(" - ")
                            .next()
                            .unwrap_or(abstract_text)
                            .to_string(),
                        url.to_string(),
                        abstract_text.to_string(),
                    ));
                }
            }
        }

        if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
            collect_topics(items, &mut results);
        }
        if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
            collect_topics(items, &mut results);
        }

        results.truncate(self.max_results);
        Ok(results)
    }

    async fn scrape(&self, url: &str) -> String {
        let response = match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                tracing::warn!("scrape of {} returned {}", url, resp.status());
                return String::new();
            }
            Err(e) => {
                tracing::warn!("failed to fetch {}: {}", url, e);
                return String::new();
            }
        };

        match response.text().await {
            Ok(html) => strip_html_tags(&html),
            Err(e) => {
                tracing::warn!("failed to read body of {}: {}", url, e);
                String::new()
            }
        }
    }
}

fn collect_topics(items: &[Value], results: &mut Vec<(String, String, String)>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            collect_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push((
            text.split(" - ").next().unwrap_or(text).to_string(),
            url.to_string(),
            text.to_string(),
        ));
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search_and_scrape(&self, query: &str) -> Result<Vec<SearchHit>, ApiError> {
        let raw = self.search(query).await?;
        tracing::info!("search for '{}' returned {} hits", query, raw.len());

        let mut hits = Vec::new();
        for (title, url, snippet) in raw {
            let raw_text = self.scrape(&url).await;
            hits.push(SearchHit {
                title,
                url,
                snippet,
                raw_text,
            });
        }

        Ok(hits)
    }
}

/// Strip tags (plus script/style bodies) out of an HTML document, keeping
/// the visible text one trimmed line per source line.
pub fn strip_html_tags(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    let mut in_script = false;
    let mut in_style = false;

    let html_lower = html.to_lowercase();
    let chars: Vec<char> = html.chars().collect();
    let chars_lower: Vec<char> = html_lower.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];

        if i + 7 < chars.len() {
            let tag: String = chars_lower[i..i + 7].iter().collect();
            if tag == "<script" {
                in_script = true;
            } else if i + 6 < chars.len()
                && chars_lower[i..i + 6].iter().collect::<String>() == "<style"
            {
                in_style = true;
            }
        }

        if in_script && i + 9 <= chars.len() {
            let tag: String = chars_lower[i..i + 9].iter().collect();
            if tag == "</script>" {
                in_script = false;
                i += 9;
                continue;
            }
        }
        if in_style && i + 8 <= chars.len() {
            let tag: String = chars_lower[i..i + 8].iter().collect();
            if tag == "</style>" {
                in_style = false;
                i += 8;
                continue;
            }
        }

        if in_script || in_style {
            i += 1;
            continue;
        }

        if c == '<' {
            in_tag = true;
        } else if c == '>' {
            in_tag = false;
        } else if !in_tag {
            result.push(c);
        }

        i += 1;
    }

    let lines: Vec<&str> = result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect();

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_scripts_and_styles() {
        let html = r#"
            <html>
            <head><script>var x = 1;</script><style>body { color: red; }</style></head>
            <body>
                <h1>Hello</h1>
                <p>World</p>
            </body>
            </html>
        "#;

        let text = strip_html_tags(html);
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains('<'));
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(strip_html_tags("just text"), "just text");
    }
}

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use scraper::{Html, Selector};
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::error::ToolError;
use crate::tool::Tool;

const MAX_SEARCH_RESULTS: usize = 10;
const MAX_FETCH_BYTES: usize = 50 * 1024;

#[derive(Default)]
pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "websearch"
    }

    fn description(&self) -> &str {
        "Search the web via DuckDuckGo's HTML interface, capped at 10 results."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "query": { "type": "string" } },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("query".into()))?;

        let resp = ctx
            .http_client()
            .post("https://html.duckduckgo.com/html/")
            .form(&[("q", query)])
            .header("Accept", "text/html")
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ToolError::Other(format!("duckduckgo search error: {}", resp.status())));
        }
        let body = resp.text().await?;

        let results = {
            let doc = Html::parse_document(&body);
            let result_sel = Selector::parse(".result").unwrap();
            let link_sel = Selector::parse("a.result__a").unwrap();
            let snippet_sel = Selector::parse(".result__snippet").unwrap();

            let mut results = Vec::new();
            for result in doc.select(&result_sel) {
                if results.len() >= MAX_SEARCH_RESULTS {
                    break;
                }
                let Some(link) = result.select(&link_sel).next() else { continue };
                let Some(href) = link.value().attr("href") else { continue };
                let url = extract_ddg_url(href);
                if !url.starts_with("http") {
                    continue;
                }
                let title = link.text().collect::<String>().trim().to_string();
                let snippet = result
                    .select(&snippet_sel)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .unwrap_or_default();
                results.push(json!({ "title": title, "url": url, "snippet": snippet }));
            }
            results
        };

        Ok(json!({ "results": results }))
    }
}

/// DuckDuckGo wraps result URLs in redirect links keyed by `uddg=`.
fn extract_ddg_url(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let start = pos + 5;
        let end = href[start..].find('&').map(|i| start + i).unwrap_or(href.len());
        let encoded = &href[start..end];
        if !encoded.is_empty() {
            return percent_decode_str(encoded).decode_utf8_lossy().into_owned();
        }
    }
    href.to_string()
}

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "webfetch"
    }

    fn description(&self) -> &str {
        "Fetch a URL's text content, truncated to 50 KB."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "url": { "type": "string" } },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value, ctx: &dyn ToolContext) -> Result<Value, ToolError> {
        let url = args
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArgs("url".into()))?;

        let resp = ctx.http_client().get(url).send().await?;
        if !resp.status().is_success() {
            return Err(ToolError::Other(format!("fetch error: {}", resp.status())));
        }
        let body = resp.text().await?;
        let truncated = truncate_byte_boundary(&body, MAX_FETCH_BYTES);
        Ok(json!({ "url": url, "content": &body[..truncated], "truncated": truncated < body.len() }))
    }
}

fn truncate_byte_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_real_url_from_ddg_redirect() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage&rut=abc";
        assert_eq!(extract_ddg_url(href), "https://example.com/page");
    }

    #[test]
    fn leaves_plain_url_untouched() {
        assert_eq!(extract_ddg_url("https://example.com"), "https://example.com");
    }
}

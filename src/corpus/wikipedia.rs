use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use super::source::{ContentSource, PageLookup, WikiPage};
use crate::core::errors::ApiError;

pub const WIKIPEDIA_API: &str = "https://en.wikipedia.org/w/api.php";

const USER_AGENT: &str = concat!(
    "ipad-chatbot/",
    env!("CARGO_PKG_VERSION"),
    " (knowledge-base extractor)"
);

/// MediaWiki action API client.
#[derive(Clone)]
pub struct WikipediaClient {
    api_url: String,
    client: Client,
}

impl WikipediaClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            api_url: api_url.into(),
            client,
        })
    }

    async fn query(&self, params: &[(&str, &str)]) -> Result<Value, ApiError> {
        let res = self
            .client
            .get(&self.api_url)
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await
            .map_err(|e| ApiError::Fetch(format!("request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Fetch(format!("content service returned {}: {}", status, text)));
        }

        let payload: Value = res
            .json()
            .await
            .map_err(|e| ApiError::Fetch(format!("invalid response: {}", e)))?;
        if let Some(err) = payload.get("error") {
            return Err(ApiError::Fetch(format!("content service error: {}", err)));
        }
        Ok(payload)
    }

    /// Article titles linked from a disambiguation page, in page order.
    async fn disambiguation_options(&self, title: &str) -> Result<Vec<String>, ApiError> {
        let payload = self
            .query(&[
                ("prop", "links"),
                ("plnamespace", "0"),
                ("pllimit", "max"),
                ("titles", title),
            ])
            .await?;

        Ok(first_page(&payload)
            .and_then(|page| page["links"].as_array())
            .map(|links| {
                links
                    .iter()
                    .filter_map(|link| link["title"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ContentSource for WikipediaClient {
    async fn lookup(&self, title: &str) -> Result<PageLookup, ApiError> {
        let payload = self
            .query(&[
                ("prop", "extracts|info|pageprops"),
                ("explaintext", "1"),
                ("inprop", "url"),
                ("ppprop", "disambiguation"),
                ("redirects", "1"),
                ("titles", title),
            ])
            .await?;

        let Some(page) = first_page(&payload) else {
            return Ok(PageLookup::NotFound);
        };
        if page.get("missing").is_some() || page.get("invalid").is_some() {
            return Ok(PageLookup::NotFound);
        }

        if page["pageprops"].get("disambiguation").is_some() {
            let resolved = page["title"].as_str().unwrap_or(title);
            let options = self.disambiguation_options(resolved).await?;
            return Ok(PageLookup::Disambiguation(options));
        }

        let page_title = page["title"].as_str().unwrap_or(title).to_string();
        let url = page["fullurl"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| article_url(&page_title));
        let content = page["extract"].as_str().unwrap_or_default().to_string();

        Ok(PageLookup::Found(WikiPage {
            title: page_title,
            url,
            content,
        }))
    }
}

fn first_page(payload: &Value) -> Option<&Value> {
    payload["query"]["pages"].as_array().and_then(|pages| pages.first())
}

fn article_url(title: &str) -> String {
    format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn fake_wiki(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        let title = params.get("titles").cloned().unwrap_or_default();
        let prop = params.get("prop").cloned().unwrap_or_default();

        let page = match (prop.as_str(), title.as_str()) {
            ("links", "Air") => json!({
                "title": "Air",
                "links": [{ "ns": 0, "title": "iPad Air" }, { "ns": 0, "title": "Air (band)" }]
            }),
            (_, "Air") => json!({ "title": "Air", "pageprops": { "disambiguation": "" } }),
            (_, "iPad Pro") => json!({
                "pageid": 1,
                "title": "iPad Pro",
                "fullurl": "https://en.wikipedia.org/wiki/IPad_Pro",
                "extract": "The iPad Pro is a line of tablets."
            }),
            _ => json!({ "title": title, "missing": true }),
        };
        Json(json!({ "query": { "pages": [page] } }))
    }

    async fn client() -> WikipediaClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/w/api.php", get(fake_wiki));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        WikipediaClient::new(format!("http://{}/w/api.php", addr), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn resolves_existing_page() {
        let lookup = client().await.lookup("iPad Pro").await.unwrap();
        assert_eq!(
            lookup,
            PageLookup::Found(WikiPage {
                title: "iPad Pro".to_string(),
                url: "https://en.wikipedia.org/wiki/IPad_Pro".to_string(),
                content: "The iPad Pro is a line of tablets.".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn reports_missing_page() {
        let lookup = client().await.lookup("iPad Pro (9th generation)").await.unwrap();
        assert_eq!(lookup, PageLookup::NotFound);
    }

    #[tokio::test]
    async fn lists_disambiguation_options_in_order() {
        let lookup = client().await.lookup("Air").await.unwrap();
        assert_eq!(
            lookup,
            PageLookup::Disambiguation(vec!["iPad Air".to_string(), "Air (band)".to_string()])
        );
    }

    #[test]
    fn builds_fallback_article_url() {
        assert_eq!(
            article_url("iPad Mini (6th generation)"),
            "https://en.wikipedia.org/wiki/iPad_Mini_(6th_generation)"
        );
    }
}

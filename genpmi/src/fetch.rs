use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use log::debug;
use reqwest::{
    Client, Response, StatusCode,
    header::{CONTENT_TYPE, IF_MODIFIED_SINCE, LAST_MODIFIED},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    cfg::Settings,
    error::FetchError,
    features::HealthCheck,
    producers::Producer,
    timestamp::{format_http_date, parse_http_date},
};

/// A downloaded body along with the headers the caches care about.
#[derive(Debug)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub last_modified: Option<SystemTime>,
}

/// HTTP access to the chain, the history API and producers' own websites.
#[derive(Clone, Debug)]
pub struct ChainClient {
    client: Client,
    chain_url: String,
    history_url: String,
}

fn last_modified(response: &Response) -> Option<SystemTime> {
    response
        .headers()
        .get(LAST_MODIFIED)?
        .to_str()
        .ok()
        .and_then(parse_http_date)
}

fn checked(url: &str, response: reqwest::Result<Response>) -> Result<Response, FetchError> {
    let response = response.map_err(|source| FetchError::Http {
        url: url.to_string(),
        source,
    })?;
    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }
    Ok(response)
}

async fn body(url: &str, response: Response) -> Result<Vec<u8>, FetchError> {
    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
}

impl ChainClient {
    pub fn new(settings: &Settings) -> Result<Self, FetchError> {
        Self::with_endpoints(
            settings.chain_url(),
            settings.history_url(),
            settings.request_timeout(),
        )
    }

    pub fn with_endpoints(
        chain_url: &str,
        history_url: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent("genpmi")
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Http {
                url: chain_url.to_string(),
                source,
            })?;
        Ok(ChainClient {
            client,
            chain_url: chain_url.trim_end_matches('/').to_string(),
            history_url: history_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: serde_json::Value,
    ) -> Result<T, FetchError> {
        let response = checked(url, self.client.post(url).json(&body).send().await)?;
        response.json().await.map_err(|e| FetchError::Response {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// Every registered producer, active or not, paging through the chain's producer table.
    pub async fn producer_rows(&self, page_size: u32) -> Result<Vec<Producer>, FetchError> {
        #[derive(Deserialize)]
        struct Page {
            rows: Vec<Producer>,
            #[serde(default)]
            more: String,
        }

        let url = format!("{}/v1/chain/get_producers", self.chain_url);
        let mut rows = Vec::new();
        let mut lower_bound = String::new();
        loop {
            let page: Page = self
                .post_json(
                    &url,
                    json!({"json": true, "limit": page_size, "lower_bound": lower_bound}),
                )
                .await?;
            for row in &page.rows {
                debug!("system: producer {}: {}", rows.len() + 1, row.owner);
            }
            let fetched = page.rows.len();
            rows.extend(page.rows);
            if page.more.is_empty() || page.more == lower_bound || fetched == 0 {
                break;
            }
            lower_bound = page.more;
        }
        Ok(rows)
    }

    /// Names of the currently scheduled producers, in schedule order.
    pub async fn top21(&self) -> Result<Vec<String>, FetchError> {
        #[derive(Deserialize)]
        struct Scheduled {
            producer_name: String,
        }
        #[derive(Deserialize)]
        struct Schedule {
            producers: Vec<Scheduled>,
        }
        #[derive(Deserialize)]
        struct ScheduleResponse {
            active: Schedule,
        }

        let url = format!("{}/v1/chain/get_producer_schedule", self.chain_url);
        let response: ScheduleResponse = self.post_json(&url, json!({})).await?;
        Ok(response
            .active
            .producers
            .into_iter()
            .map(|p| p.producer_name)
            .collect())
    }

    /// Raw `get_actions` response for the producerjson contract.
    pub async fn producerjson_actions(&self, limit: u32) -> Result<Vec<u8>, FetchError> {
        let url = format!(
            "{}/v2/history/get_actions?act.account=producerjson&limit={limit}",
            self.history_url
        );
        let response = checked(
            &url,
            self.client
                .get(&url)
                .header("accept", "application/json")
                .send()
                .await,
        )?;
        body(&url, response).await
    }

    /// Fetch a document unless it has not changed since `cached_at`; `Ok(None)` means not modified.
    pub async fn fetch_if_modified(
        &self,
        url: &str,
        cached_at: Option<SystemTime>,
    ) -> Result<Option<Download>, FetchError> {
        let mut request = self.client.get(url);
        if let Some(since) = cached_at.and_then(format_http_date) {
            request = request.header(IF_MODIFIED_SINCE, since);
        }
        let response = request.send().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        let response = checked(url, Ok(response))?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = last_modified(&response);
        Ok(Some(Download {
            bytes: body(url, response).await?,
            content_type,
            last_modified,
        }))
    }

    pub async fn download(&self, url: &str) -> Result<Download, FetchError> {
        self.fetch_if_modified(url, None)
            .await?
            .ok_or_else(|| FetchError::Response {
                url: url.to_string(),
                reason: "unexpected 304 Not Modified".to_string(),
            })
    }

    /// The server's `Last-Modified` for `url`, from a HEAD request.
    pub async fn last_modified(&self, url: &str) -> Result<Option<SystemTime>, FetchError> {
        let response = checked(url, self.client.head(url).send().await)?;
        Ok(last_modified(&response))
    }
}

#[async_trait]
impl HealthCheck for ChainClient {
    async fn answers(&self, endpoint: &str) -> bool {
        let url = format!("{}/v2/health", endpoint.trim_end_matches('/'));
        match checked(
            &url,
            self.client
                .get(&url)
                .header("accept", "application/json")
                .send()
                .await,
        ) {
            Ok(_) => true,
            Err(e) => {
                debug!("system: health check failed: {e}");
                false
            }
        }
    }
}

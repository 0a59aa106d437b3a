use async_trait::async_trait;
use reqwest::{Client, header};
use std::time::Duration;
use tracing::debug;

use super::{ProbeStatus, StatusProbe};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/74.0.3729.131 Safari/537.36";

/// Probes a UID through the public Graph picture endpoint. A live profile
/// answers with picture metadata (`height`/`width`), anything else counts as dead.
pub struct GraphProbe {
    client: Client,
    base_url: String,
}

impl GraphProbe {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn picture_url(&self, uid: &str) -> String {
        format!("{}/{uid}/picture?redirect=false", self.base_url)
    }
}

fn classify_body(body: &str) -> ProbeStatus {
    if body.contains("height") && body.contains("width") {
        ProbeStatus::Live
    } else {
        ProbeStatus::Dead
    }
}

#[async_trait]
impl StatusProbe for GraphProbe {
    async fn check(&self, uid: &str) -> ProbeStatus {
        let result = self
            .client
            .get(self.picture_url(uid))
            .header(header::CONNECTION, "keep-alive")
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                if e.is_timeout() {
                    debug!(uid = uid, "Probe request timed out.");
                } else {
                    debug!(uid = uid, error = %e, "Probe request failed.");
                }
                return ProbeStatus::Error;
            }
        };

        match response.text().await {
            Ok(body) => classify_body(&body),
            Err(e) => {
                debug!(uid = uid, error = %e, "Failed to read probe response body.");
                ProbeStatus::Error
            }
        }
    }
}

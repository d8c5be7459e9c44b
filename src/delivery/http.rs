//! HTTP delivery adapter
//!
//! PUTs one feature per request to the configured endpoint. The endpoint
//! contract is deliberately small: 2xx means accepted, 401/403 means the
//! credential is bad, everything else is transient. `X-Tacfeed-Item` carries
//! the idempotency key so endpoints can drop duplicates from at-least-once
//! redelivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::DeliveryConfig;
use crate::cot;
use crate::types::QueueItem;

use super::{DeliveryOutcome, FeedFormat, TacticalSink};

pub struct HttpTacticalSink {
    client: reqwest::Client,
    endpoint_url: String,
    api_key: Option<String>,
    format: FeedFormat,
}

impl HttpTacticalSink {
    pub fn new(config: &DeliveryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint_url: config.endpoint_url.clone(),
            api_key: config.api_key.clone(),
            format: config.format,
        })
    }

    fn render_body(&self, item: &QueueItem) -> Result<String, String> {
        match self.format {
            FeedFormat::GeoJson => serde_json::to_string(&item.feature)
                .map_err(|e| format!("serialize feature: {}", e)),
            FeedFormat::CotXml => {
                cot::to_cot_xml(&item.feature).map_err(|e| format!("render CoT: {}", e))
            }
        }
    }
}

fn content_type(format: FeedFormat) -> &'static str {
    match format {
        FeedFormat::GeoJson => "application/geo+json",
        FeedFormat::CotXml => "application/xml",
    }
}

#[async_trait]
impl TacticalSink for HttpTacticalSink {
    async fn push(&self, item: &QueueItem) -> DeliveryOutcome {
        let body = match self.render_body(item) {
            Ok(body) => body,
            Err(msg) => return DeliveryOutcome::TransientFailure(msg),
        };

        let mut request = self
            .client
            .put(&self.endpoint_url)
            .header("Content-Type", content_type(self.format))
            .header("X-Tacfeed-Item", item.id.to_string())
            .body(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                match status {
                    s if s.is_success() => {
                        debug!(item_id = %item.id, status = %status, "Feature delivered");
                        DeliveryOutcome::Delivered
                    }
                    StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                        DeliveryOutcome::AuthFailure {
                            status: status.as_u16(),
                        }
                    }
                    s => DeliveryOutcome::TransientFailure(format!("endpoint returned HTTP {}", s)),
                }
            }
            Err(e) => DeliveryOutcome::TransientFailure(format!("request failed: {}", e)),
        }
    }

    fn destination(&self) -> String {
        format!("{} ({})", self.endpoint_url, self.format)
    }
}

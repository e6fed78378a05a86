//! HTTP control endpoint client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::RecordingNotifier;
use crate::config::NotifyConfig;
use crate::errors::{Result, SentryError};

/// Plain GET requests against the recorder's start/stop URLs
pub struct HttpNotifier {
    client: Client,
    start_url: String,
    stop_url: String,
}

impl HttpNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(config.read_timeout_ms))
            .build()
            .map_err(|e| {
                SentryError::Configuration(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            start_url: config.start_url.clone(),
            stop_url: config.stop_url.clone(),
        })
    }

    async fn get(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

#[async_trait]
impl RecordingNotifier for HttpNotifier {
    async fn notify_start(&self) -> Result<String> {
        self.get(&self.start_url).await
    }

    async fn notify_stop(&self) -> Result<String> {
        self.get(&self.stop_url).await
    }
}

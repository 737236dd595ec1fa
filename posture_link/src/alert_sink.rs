// THEORY:
// Alerts leave the device as one HTTP POST each. Delivery is best effort: a
// non-2xx answer or a network failure is reported back to the engine's dispatcher,
// which logs it. Nothing is retried and the accumulator is never touched.

use std::time::Duration;

use posture_vision::runtime::detached::LogAlerts;
use posture_vision::{AlertPayload, AlertSink, ChannelError};
use tracing::info;

use crate::error::LinkError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpAlertSink {
    client: reqwest::Client,
    url: String,
}

impl HttpAlertSink {
    pub fn new(url: impl Into<String>) -> Result<Self, LinkError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, url: url.into() })
    }

    pub async fn post(&self, payload: &AlertPayload) -> Result<(), LinkError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LinkError::Status {
                url: self.url.clone(),
                status,
            });
        }
        info!(url = %self.url, posture = %payload.posture, "alert delivered");
        Ok(())
    }
}

impl AlertSink for HttpAlertSink {
    async fn notify(&mut self, payload: AlertPayload) -> Result<(), ChannelError> {
        Ok(self.post(&payload).await?)
    }
}

/// Where the daemon sends alerts: an HTTP endpoint when one is configured, the log otherwise.
#[derive(Debug, Clone)]
pub enum AlertRoute {
    Http(HttpAlertSink),
    Log(LogAlerts),
}

impl AlertRoute {
    pub fn from_url(url: Option<&str>) -> Result<Self, LinkError> {
        match url {
            Some(url) => Ok(AlertRoute::Http(HttpAlertSink::new(url)?)),
            None => Ok(AlertRoute::Log(LogAlerts)),
        }
    }
}

impl AlertSink for AlertRoute {
    async fn notify(&mut self, payload: AlertPayload) -> Result<(), ChannelError> {
        match self {
            AlertRoute::Http(sink) => sink.notify(payload).await,
            AlertRoute::Log(sink) => sink.notify(payload).await,
        }
    }
}

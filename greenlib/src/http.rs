use crate::service::{ControlService, ServiceError};
use crate::types::{Ack, ControlRequest, DeviceStates, ModeBody, OperationMode, SensorSnapshot};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const STATUS_PATH: &str = "/status";
pub const SENSOR_DATA_PATH: &str = "/sensor-data";
pub const OPERATION_MODE_PATH: &str = "/operation-mode";
pub const CONTROL_PATH: &str = "/control";
pub const RESET_PATH: &str = "/reset";

// Talks to the greenhouse control service over JSON/HTTP.
pub struct HttpControlService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpControlService {
    // `base_url` may be a bare host:port; http is assumed then. No timeout
    // means the transport default applies.
    pub fn new(base_url: &str, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &'static str) -> Result<T, ServiceError> {
        let url = self.url(path);
        log::debug!("GET {url}");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| ServiceError::Transport {
                url: url.clone(),
                source,
            })?;
        let text = read_body(&url, resp).await?;
        decode(path, &text)
    }

    async fn post_ack<B: Serialize>(
        &self,
        path: &'static str,
        body: Option<&B>,
    ) -> Result<Ack, ServiceError> {
        let url = self.url(path);
        log::debug!("POST {url}");
        let mut req = self.client.post(&url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|source| ServiceError::Transport {
            url: url.clone(),
            source,
        })?;
        let text = read_body(&url, resp).await?;
        let ack: Ack = decode(path, &text)?;
        ServiceError::check_ack(path, ack)
    }
}

#[async_trait]
impl ControlService for HttpControlService {
    async fn status(&self) -> Result<DeviceStates, ServiceError> {
        self.get_json(STATUS_PATH).await
    }

    async fn sensor_data(&self) -> Result<SensorSnapshot, ServiceError> {
        self.get_json(SENSOR_DATA_PATH).await
    }

    async fn operation_mode(&self) -> Result<OperationMode, ServiceError> {
        let body: ModeBody = self.get_json(OPERATION_MODE_PATH).await?;
        Ok(body.mode)
    }

    async fn set_operation_mode(&self, mode: OperationMode) -> Result<Ack, ServiceError> {
        self.post_ack(OPERATION_MODE_PATH, Some(&ModeBody { mode }))
            .await
    }

    async fn control(&self, request: &ControlRequest) -> Result<Ack, ServiceError> {
        self.post_ack(CONTROL_PATH, Some(request)).await
    }

    async fn reset(&self) -> Result<Ack, ServiceError> {
        self.post_ack::<()>(RESET_PATH, None).await
    }
}

fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

// Non-2xx responses become errors carrying the status code and body.
async fn read_body(url: &str, resp: reqwest::Response) -> Result<String, ServiceError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|source| ServiceError::Transport {
            url: url.to_string(),
            source,
        })?;
    if !status.is_success() {
        return Err(ServiceError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    Ok(text)
}

fn decode<T: DeserializeOwned>(endpoint: &'static str, text: &str) -> Result<T, ServiceError> {
    serde_json::from_str(text).map_err(|err| ServiceError::Malformed {
        endpoint,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod base_url {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(normalize_base_url("10.0.0.5:5000"), "http://10.0.0.5:5000");
        assert_eq!(
            normalize_base_url("http://163.180.105.108:5000/api/"),
            "http://163.180.105.108:5000/api"
        );
        assert_eq!(
            normalize_base_url("https://greenhouse.example"),
            "https://greenhouse.example"
        );
    }
}

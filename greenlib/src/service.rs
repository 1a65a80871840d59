use crate::types::{Ack, ControlRequest, DeviceStates, OperationMode, SensorSnapshot};
use async_trait::async_trait;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP error! status: {status}, body: {body}")]
    Status { status: u16, body: String },
    // The service answered but refused the operation (`status: "error"`).
    #[error("{message}")]
    Rejected { message: String },
    #[error("malformed response from {endpoint}: {reason}")]
    Malformed {
        endpoint: &'static str,
        reason: String,
    },
}

impl ServiceError {
    // Turns an acknowledgement into an error unless it reports success.
    pub fn check_ack(endpoint: &'static str, ack: Ack) -> Result<Ack, ServiceError> {
        if ack.is_success() {
            Ok(ack)
        } else if ack.status == crate::types::STATUS_ERROR {
            Err(ServiceError::Rejected {
                message: ack.message.unwrap_or_else(|| "unknown error".to_string()),
            })
        } else {
            Err(ServiceError::Malformed {
                endpoint,
                reason: format!("unexpected status '{}'", ack.status),
            })
        }
    }
}

// The remote device-control service. One implementation talks HTTP; the fake
// keeps everything in memory for tests and the demo server.
//
// Write methods only return Ok for an explicit success acknowledgement.
#[async_trait]
pub trait ControlService: Send + Sync {
    async fn status(&self) -> Result<DeviceStates, ServiceError>;

    async fn sensor_data(&self) -> Result<SensorSnapshot, ServiceError>;

    async fn operation_mode(&self) -> Result<OperationMode, ServiceError>;

    async fn set_operation_mode(&self, mode: OperationMode) -> Result<Ack, ServiceError>;

    async fn control(&self, request: &ControlRequest) -> Result<Ack, ServiceError>;

    async fn reset(&self) -> Result<Ack, ServiceError>;
}

#[cfg(test)]
mod check_ack {
    use super::*;

    #[test]
    fn success() {
        let ack = ServiceError::check_ack("/reset", Ack::success(None)).unwrap();
        assert!(ack.is_success());
    }

    #[test]
    fn rejected() {
        let err = ServiceError::check_ack("/reset", Ack::error("busy")).unwrap_err();
        assert_eq!(err.to_string(), "busy");

        let ack = Ack {
            status: "error".to_string(),
            message: None,
        };
        let err = ServiceError::check_ack("/reset", ack).unwrap_err();
        assert_eq!(err.to_string(), "unknown error");
    }

    #[test]
    fn unexpected_status() {
        let ack = Ack {
            status: "pending".to_string(),
            message: None,
        };
        assert!(matches!(
            ServiceError::check_ack("/operation-mode", ack),
            Err(ServiceError::Malformed { .. })
        ));
    }
}

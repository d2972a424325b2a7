use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::Error;

tokio::task_local! {
    /// Id of the request being served, set by the request-context middleware.
    pub static REQUEST_ID: String;
}

/// Unified JSON envelope of every API response.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            request_id: REQUEST_ID.try_with(Clone::clone).ok(),
        }
    }
}

/// Successful response carrying `data`.
#[derive(Debug)]
pub struct ApiResponse<T>(pub T);

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

impl ApiResponse<MessageBody> {
    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse(MessageBody {
            message: message.into(),
        })
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            success: true,
            data: Some(self.0),
            error: None,
            meta: Meta::now(),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::UpstreamFailure(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Error::UpstreamFailure(_) | Error::Internal(_) => error!(error = %self, "request failed"),
            _ => warn!(error = %self, status = status.as_u16(), "request rejected"),
        }

        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(ErrorBody {
                code: self.code(),
                message: self.public_message(),
            }),
            meta: Meta::now(),
        };
        (status, Json(body)).into_response()
    }
}

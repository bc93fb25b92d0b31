//! Client-visible error envelope.
//!
//! Every failure maps onto a stable `type` string and an HTTP status; the
//! body shape is the OpenAI error envelope so existing client SDKs surface
//! it correctly.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::sse::AggregateError;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    InvalidRequest {
        message: String,
        param: Option<&'static str>,
    },

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("too many concurrent requests")]
    RateLimited,

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("response aggregation failed: {0}")]
    Aggregation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidApiKey => StatusCode::UNAUTHORIZED,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Aggregation(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The stable, client-visible error type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest { .. } => "invalid_request_error",
            Self::InvalidApiKey => "invalid_api_key",
            Self::RateLimited => "rate_limit_error",
            Self::Upstream(_) => "upstream_error",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::Aggregation(_) => "aggregation_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn param(&self) -> Option<&'static str> {
        match self {
            Self::InvalidRequest { param, .. } => *param,
            _ => None,
        }
    }
}

impl From<crate::protocol::ValidationError> for ApiError {
    fn from(error: crate::protocol::ValidationError) -> Self {
        Self::InvalidRequest {
            message: error.message,
            param: Some(error.param),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(error: UpstreamError) -> Self {
        if error.is_timeout() {
            Self::UpstreamTimeout
        } else {
            Self::Upstream(error.to_string())
        }
    }
}

impl From<AggregateError> for ApiError {
    fn from(error: AggregateError) -> Self {
        Self::Aggregation(error.to_string())
    }
}

#[derive(serde::Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(serde::Serialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    kind: &'static str,
    code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    param: Option<&'static str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorEnvelope {
            error: ErrorBody {
                message: self.to_string(),
                kind: self.kind(),
                code: status.as_u16(),
                param: self.param(),
            },
        });
        (status, body).into_response()
    }
}

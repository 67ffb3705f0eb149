//! Error taxonomy and response envelope.
//!
//! Every handler returns either an [`ApiResponse`] or an [`ApiError`]; the
//! error side maps one-to-one onto HTTP status codes so callers can branch on
//! the kind without parsing messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::domain::cart::LineIssue;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("insufficient stock for {name}")]
    InsufficientStock { name: String },

    #[error("cart failed checkout validation")]
    CheckoutValidationFailed(Vec<LineIssue>),

    #[error("cannot change order status from '{from}' to '{to}'")]
    IllegalTransition { from: &'static str, to: &'static str },

    #[error("payment already completed")]
    PaymentAlreadySettled,

    #[error("invalid webhook signature")]
    InvalidSignature,

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("oversold: order {order_id} could not be settled against remaining stock")]
    Oversold { order_id: uuid::Uuid },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("payment gateway error: {0}")]
    Gateway(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidReference(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientStock { .. }
            | Self::CheckoutValidationFailed(_)
            | Self::IllegalTransition { .. }
            | Self::PaymentAlreadySettled => StatusCode::BAD_REQUEST,
            Self::InvalidSignature => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Oversold { .. } | Self::Gateway(_) | Self::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidReference(_) => "InvalidReference",
            Self::NotFound(_) => "NotFound",
            Self::InsufficientStock { .. } => "InsufficientStock",
            Self::CheckoutValidationFailed(_) => "CheckoutValidationFailed",
            Self::IllegalTransition { .. } => "IllegalTransition",
            Self::PaymentAlreadySettled => "PaymentAlreadySettled",
            Self::InvalidSignature => "InvalidSignature",
            Self::Unauthorized => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::Oversold { .. } => "Oversold",
            Self::Validation(_) => "Validation",
            Self::Gateway(_) => "Gateway",
            Self::Storage(_) => "Storage",
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    status_code: u16,
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<LineIssue>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let errors = match &self {
            // Checkout validation ships the full per-line problem set so the
            // client can fix everything in one round trip.
            Self::CheckoutValidationFailed(issues) => Some(issues.clone()),
            _ => None,
        };
        let body = ErrorBody {
            status_code: status.as_u16(),
            error: self.kind(),
            message: self.to_string(),
            errors,
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Success envelope shared by every endpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub status_code: u16,
    pub data: T,
    pub message: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::OK, data, message)
    }

    pub fn created(data: T, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        Self::with_status(StatusCode::CREATED, data, message)
    }

    fn with_status(
        status: StatusCode,
        data: T,
        message: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (
            status,
            Json(Self { status_code: status.as_u16(), data, message: message.into() }),
        )
    }
}

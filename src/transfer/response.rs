//! Response shaping
//!
//! Success payloads are JSON documents, failures are `{"detail": "..."}` with
//! the status code derived from the failure kind.

use crate::router::RouterError;
use crate::storage::{FailureKind, TransferFailure};
use crate::upload::UploadError;
use bytes::Bytes;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use std::convert::Infallible;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body of every API response
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// Body from a complete buffer
pub fn full_body(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// JSON response with the given status.
///
/// Serialization failures turn into a 500 with a `detail` body.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<ResponseBody> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(full_body(body));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => ApiError::internal(format!("Failed to encode response: {}", e)).into_response(),
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

/// Failure returned to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    pub fn into_response(self) -> Response<ResponseBody> {
        let body = ErrorBody {
            detail: &self.detail,
        };
        // A struct with one string field always serializes
        let bytes = serde_json::to_vec(&body).unwrap_or_default();

        let mut response = Response::new(full_body(bytes));
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

impl From<TransferFailure> for ApiError {
    fn from(failure: TransferFailure) -> Self {
        let status = match failure.kind {
            FailureKind::PolicyViolation => StatusCode::BAD_REQUEST,
            FailureKind::NotFound => StatusCode::NOT_FOUND,
            FailureKind::BackendError => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, failure.message)
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        if err.is_client_error() {
            Self::new(StatusCode::BAD_REQUEST, err.to_string())
        } else {
            Self::internal(format!("Failed to upload file: {}", err))
        }
    }
}

impl From<RouterError> for ApiError {
    fn from(err: RouterError) -> Self {
        let status = match err {
            RouterError::NotFound => StatusCode::NOT_FOUND,
            RouterError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RouterError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        };
        Self::new(status, err.to_string())
    }
}

//! Transfer handler
//!
//! Drives one request end to end: receives the inbound stream, applies the
//! upload policy, calls the [`StorageGateway`] and shapes the outcome into an
//! HTTP response.
//!
//! # Upload flow
//!
//! 1. The `file` part is spooled to disk while its size is counted
//! 2. A [`FileCandidate`] is validated against the [`UploadPolicy`]
//! 3. Only an accepted candidate is streamed to the backend
//!
//! Rejected uploads never reach [`StorageGateway::put`].

pub mod response;

pub use response::{json_response, ApiError, ResponseBody};

use crate::metrics;
use crate::router::{Route, RouteParser};
use crate::storage::{FailureKind, StorageGateway, TransferFailure, DEFAULT_CONTENT_TYPE};
use crate::upload::{self, ReceivedFile};
use crate::validation::{self, FileCandidate, UploadPolicy};
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::{Body, Frame};
use hyper::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use response::BoxError;
use serde_json::json;
use std::sync::Arc;

type HandlerResult = Result<Response<ResponseBody>, ApiError>;

/// Request orchestrator shared by all connections
#[derive(Clone)]
pub struct TransferHandler {
    gateway: StorageGateway,
    policy: Arc<UploadPolicy>,
}

impl TransferHandler {
    pub fn new(gateway: StorageGateway, policy: UploadPolicy) -> Self {
        Self {
            gateway,
            policy: Arc::new(policy),
        }
    }

    pub fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Route and serve a request. Failures become `{"detail": ...}` responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send,
    {
        let route = match RouteParser::parse(req.method(), req.uri().path()) {
            Ok(route) => route,
            Err(e) => {
                tracing::debug!(error = %e, "No route for request");
                let response = ApiError::from(e).into_response();
                metrics::record_http_request("unmatched", response.status().as_u16());
                return response;
            }
        };
        let route_name = route.name();

        let result = match route {
            Route::Root => Ok(self.root()),
            Route::Health => Ok(self.health()),
            Route::Upload => {
                let content_type = req
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                self.upload(content_type.as_deref(), req.into_body()).await
            }
            Route::Download { filename } => self.download(&filename).await,
            Route::Delete { filename } => self.delete(&filename).await,
            Route::Metadata { filename } => self.metadata(&filename).await,
        };

        let response = result.unwrap_or_else(ApiError::into_response);
        metrics::record_http_request(route_name, response.status().as_u16());
        response
    }

    /// Service description
    pub fn root(&self) -> Response<ResponseBody> {
        json_response(
            StatusCode::OK,
            &json!({
                "message": "GCP Bucket File API",
                "version": crate::VERSION,
                "endpoints": {
                    "health": "/health",
                    "upload": "/upload",
                    "download": "/download/{filename}",
                    "delete": "/delete/{filename}",
                    "metadata": "/metadata/{filename}"
                }
            }),
        )
    }

    pub fn health(&self) -> Response<ResponseBody> {
        json_response(StatusCode::OK, &json!({ "status": "healthy" }))
    }

    /// Receive, validate and store a multipart upload
    pub async fn upload<B>(&self, content_type: Option<&str>, body: B) -> HandlerResult
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError> + Send,
    {
        let ReceivedFile {
            filename,
            content_type: part_type,
            spool,
        } = upload::receive_file(content_type, body, self.policy.max_size_bytes()).await?;

        let content_type = part_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let size = spool.len();
        let candidate = FileCandidate::new(filename.as_str(), size, content_type.as_str());

        if let Err(violation) = validation::validate(&candidate, &self.policy) {
            metrics::record_policy_violation(violation.reason());
            metrics::record_transfer("upload", FailureKind::PolicyViolation.as_str());
            tracing::warn!(
                filename = %filename,
                size,
                reason = violation.reason(),
                "Upload rejected: {}",
                violation
            );
            return Err(TransferFailure::from(violation).into());
        }

        let stream = spool.into_stream().await?;
        let stored = self
            .gateway
            .put(&filename, stream, size, &content_type)
            .await?;

        tracing::info!(filename = %filename, size = stored.size_bytes, "File uploaded");
        Ok(json_response(
            StatusCode::OK,
            &json!({
                "message": "File uploaded successfully",
                "data": {
                    "filename": stored.object_key,
                    "bucket": self.gateway.bucket(),
                    "size": stored.size_bytes,
                    "content_type": stored.content_type
                }
            }),
        ))
    }

    /// Stream a stored object back to the client
    pub async fn download(&self, filename: &str) -> HandlerResult {
        let download = self.gateway.get_stream(filename).await?;

        let frames = download
            .body
            .inspect_ok(|chunk| metrics::record_bytes("download", chunk.len() as u64))
            .map_ok(Frame::data)
            .map_err(BoxError::from);
        let mut response = Response::new(StreamBody::new(frames).boxed_unsync());

        let headers = response.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_str(&download.content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
        );
        if let Some(value) = content_disposition(filename) {
            headers.insert(CONTENT_DISPOSITION, value);
        }
        if let Some(size) = download.size {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
        }

        tracing::info!(filename = %filename, size = ?download.size, "Streaming download");
        Ok(response)
    }

    /// Remove a stored object
    pub async fn delete(&self, filename: &str) -> HandlerResult {
        self.gateway.delete(filename).await?;

        tracing::info!(filename = %filename, "File deleted");
        Ok(json_response(
            StatusCode::OK,
            &json!({
                "message": "File deleted successfully",
                "data": {
                    "message": format!("File '{}' deleted successfully", filename),
                    "filename": filename
                }
            }),
        ))
    }

    /// Describe a stored object
    pub async fn metadata(&self, filename: &str) -> HandlerResult {
        let meta = self.gateway.metadata(filename).await?;

        Ok(json_response(
            StatusCode::OK,
            &json!({
                "message": "File metadata retrieved successfully",
                "data": {
                    "filename": meta.name,
                    "size": meta.size,
                    "content_type": meta.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE),
                    "created": meta.created,
                    "updated": meta.updated
                }
            }),
        ))
    }
}

/// `attachment` disposition, falling back to the RFC 5987 form for names that
/// are not plain visible ASCII
fn content_disposition(filename: &str) -> Option<HeaderValue> {
    let plain = filename.chars().all(|c| c.is_ascii() && !c.is_ascii_control());
    let value = if plain {
        let quoted = filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("attachment; filename=\"{}\"", quoted)
    } else {
        format!(
            "attachment; filename*=UTF-8''{}",
            utf8_percent_encode(filename, NON_ALPHANUMERIC)
        )
    };
    HeaderValue::from_str(&value).ok()
}

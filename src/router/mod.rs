//! File API Router
//!
//! Parses the method and path of incoming requests into a [`Route`].

use hyper::Method;
use percent_encoding::percent_decode_str;
use thiserror::Error;

/// Router errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// API routes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// GET /
    Root,
    /// GET /health
    Health,
    /// POST /upload
    Upload,
    /// GET /download/{filename}
    Download { filename: String },
    /// DELETE /delete/{filename}
    Delete { filename: String },
    /// GET /metadata/{filename}
    Metadata { filename: String },
}

impl Route {
    /// Short name used as a metric label
    pub fn name(&self) -> &'static str {
        match self {
            Route::Root => "root",
            Route::Health => "health",
            Route::Upload => "upload",
            Route::Download { .. } => "download",
            Route::Delete { .. } => "delete",
            Route::Metadata { .. } => "metadata",
        }
    }
}

/// Request parser
pub struct RouteParser;

impl RouteParser {
    /// Parse an HTTP method and path into a route
    pub fn parse(method: &Method, path: &str) -> Result<Route, RouterError> {
        let (route, allowed) = match path {
            "/" => (Route::Root, Method::GET),
            "/health" => (Route::Health, Method::GET),
            "/upload" => (Route::Upload, Method::POST),
            _ => Self::parse_object_route(path)?,
        };

        if *method != allowed {
            return Err(RouterError::MethodNotAllowed);
        }
        Ok(route)
    }

    fn parse_object_route(path: &str) -> Result<(Route, Method), RouterError> {
        let path = path.strip_prefix('/').ok_or(RouterError::NotFound)?;
        let (prefix, raw) = path.split_once('/').ok_or(RouterError::NotFound)?;

        // {filename} is a single path segment
        if raw.is_empty() || raw.contains('/') {
            return Err(RouterError::NotFound);
        }

        let filename = Self::decode(raw)?;
        match prefix {
            "download" => Ok((Route::Download { filename }, Method::GET)),
            "delete" => Ok((Route::Delete { filename }, Method::DELETE)),
            "metadata" => Ok((Route::Metadata { filename }, Method::GET)),
            _ => Err(RouterError::NotFound),
        }
    }

    fn decode(raw: &str) -> Result<String, RouterError> {
        percent_decode_str(raw)
            .decode_utf8()
            .map(|s| s.into_owned())
            .map_err(|_| RouterError::InvalidPath(format!("'{}' is not valid UTF-8", raw)))
    }
}

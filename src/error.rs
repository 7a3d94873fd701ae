use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{AcceptRanges, ContentRange, HeaderMapExt};
use thiserror::Error;

/// Why a request could not be answered with a file.
#[derive(Debug, Error)]
pub enum SendError {
    /// Missing, hidden, outside the root, or otherwise not servable. Carries
    /// no filesystem detail.
    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    /// A `Range` header was sent but named no satisfiable range of a
    /// resource of `size` bytes.
    #[error("range not satisfiable for resource of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    /// The multipart boundary generator failed.
    #[error("failed to generate multipart boundary")]
    Boundary(#[source] io::Error),
}

impl SendError {
    pub fn status(&self) -> StatusCode {
        match self {
            SendError::NotFound => StatusCode::NOT_FOUND,
            SendError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            SendError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            SendError::Boundary(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        if let SendError::Boundary(e) = &self {
            tracing::error!(error = %e, "failed to generate multipart boundary");
        }

        let mut response = (self.status(), ()).into_response();
        let headers = response.headers_mut();
        headers.typed_insert(AcceptRanges::bytes());
        if let SendError::RangeNotSatisfiable { size } = self {
            headers.typed_insert(ContentRange::unsatisfied_bytes(size));
        }
        response
    }
}

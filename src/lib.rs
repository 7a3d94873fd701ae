//! # axum-range-static
//!
//! Static file serving for [`axum`][1] with HTTP range support.
//!
//! Requests without a `Range` header get the whole file. A `Range` header
//! naming one range gets `206 Partial Content` with that range; several
//! ranges get a `multipart/byteranges` body that is streamed from the file
//! one part at a time, never buffered whole. Paths are confined to a root
//! directory and dotfiles are hidden unless enabled.
//!
//! ```no_run
//! use axum_range_static::{RangeStatic, SendOptions};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let files = RangeStatic::new(SendOptions::new("public").with_maxage(3600))?;
//!     let app: axum::Router = files.router();
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//!     axum::serve(listener, app).await
//! }
//! ```
//!
//! The pieces are usable on their own: [`parse_range_header`] parses a
//! `Range` header, [`send`] plans a response and writes its headers, and
//! [`MultiSourceStream`] chains any [`Source`]s into one response body.
//!
//! [1]: https://docs.rs/axum

mod boundary;
mod config;
mod error;
mod file;
mod listing;
mod range;
mod send;
mod stream;

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum_extra::headers::{AcceptRanges, HeaderMapExt};

pub use boundary::random_token;
pub use config::{BoundaryGenerator, SendOptions, DEFAULT_BOUNDARY_LEN};
pub use error::SendError;
pub use file::FileSegment;
pub use listing::{read_dirents, render_dirents, Dirent};
pub use range::{parse_range_header, ByteRange};
pub use send::{closing_boundary, content_type, normalize_path, part_header, send, TransferPlan};
pub use stream::{BoxSource, BufferSource, MultiSourceStream, Source};

/// Serves files below a root directory. Cheap to clone; every clone shares
/// the same options.
#[derive(Debug, Clone)]
pub struct RangeStatic {
    options: Arc<SendOptions>,
}

impl RangeStatic {
    /// Resolves `options.root` to an absolute path once; it is not re-read
    /// per request.
    pub fn new(options: SendOptions) -> io::Result<Self> {
        let options = options.resolve()?;
        tracing::debug!(root = %options.root.display(), "serving files");
        Ok(RangeStatic { options: Arc::new(options) })
    }

    pub fn options(&self) -> &SendOptions {
        &self.options
    }

    /// A router answering every path from the root directory.
    pub fn router<S>(self) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        Router::new().fallback(serve_files).with_state(self)
    }

    /// Answers one request.
    pub async fn serve(&self, request: Request) -> Response {
        let (parts, _body) = request.into_parts();
        let mut headers = HeaderMap::new();
        headers.typed_insert(AcceptRanges::bytes());

        if parts.method != Method::GET && parts.method != Method::HEAD {
            return (headers, SendError::MethodNotAllowed).into_response();
        }
        let head = parts.method == Method::HEAD;

        let plan = match send(&parts.headers, &mut headers, parts.uri.path(), &self.options).await {
            Ok(plan) => plan,
            Err(e) => return (headers, e).into_response(),
        };

        match plan {
            TransferPlan::Directory { path, absolute } => {
                if !self.options.directory {
                    return (headers, SendError::NotFound).into_response();
                }
                match read_dirents(&path, &absolute, self.options.hidden).await {
                    Ok(dirents) => {
                        let html = render_dirents(&dirents);
                        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
                        let body = if head { Body::empty() } else { Body::from(html) };
                        (headers, body).into_response()
                    }
                    Err(e) => {
                        tracing::debug!(%path, error = %e, "failed to read directory");
                        (headers, SendError::NotFound).into_response()
                    }
                }
            }
            plan => {
                let status = plan.status();
                let body = if head { Body::empty() } else { plan.into_body() };
                (status, headers, body).into_response()
            }
        }
    }
}

async fn serve_files(State(files): State<RangeStatic>, request: Request) -> Response {
    files.serve(request).await
}

#[cfg(test)]
mod tests {
    use std::io;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use tempfile::TempDir;

    use super::*;

    const FIXTURE: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    async fn setup(options: SendOptions) -> io::Result<(TempDir, RangeStatic)> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(dir.path().join("fixture.txt"), FIXTURE).await?;
        tokio::fs::create_dir(dir.path().join("sub")).await?;
        tokio::fs::write(dir.path().join("sub").join("inner.txt"), "inner").await?;
        let mut options = options;
        options.root = dir.path().to_path_buf();
        let files = RangeStatic::new(options)?;
        Ok((dir, files))
    }

    fn request(method: Method, uri: &str, range: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(range) = range {
            builder = builder.header("Range", range);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn collect_body(response: Response) -> String {
        let mut string = String::new();
        let mut stream = response.into_body().into_data_stream();
        while let Some(chunk) = stream.next().await.transpose().unwrap() {
            string += std::str::from_utf8(&chunk).unwrap();
        }
        string
    }

    #[tokio::test]
    async fn test_method_not_allowed() -> io::Result<()> {
        let (_dir, files) = setup(SendOptions::default()).await?;
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let response = files.serve(request(method, "/fixture.txt", None)).await;
            assert_eq!(StatusCode::METHOD_NOT_ALLOWED, response.status());
            assert_eq!("bytes", response.headers()["accept-ranges"]);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_head_has_headers_but_no_body() -> io::Result<()> {
        let (_dir, files) = setup(SendOptions::default()).await?;
        let response = files.serve(request(Method::HEAD, "/fixture.txt", Some("bytes=0-9"))).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
        assert_eq!("10", response.headers()["content-length"]);
        assert_eq!("bytes 0-9/62", response.headers()["content-range"]);
        assert_eq!("", collect_body(response).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_get_range() -> io::Result<()> {
        let (_dir, files) = setup(SendOptions::default()).await?;
        let response = files.serve(request(Method::GET, "/fixture.txt", Some("bytes=40-"))).await;
        assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
        assert_eq!("bytes 40-61/62", response.headers()["content-range"]);
        assert_eq!("efghijklmnopqrstuvwxyz", collect_body(response).await);
        Ok(())
    }

    #[tokio::test]
    async fn test_directory_without_listing_is_not_found() -> io::Result<()> {
        let (_dir, files) = setup(SendOptions::default()).await?;
        let response = files.serve(request(Method::GET, "/sub", None)).await;
        assert_eq!(StatusCode::NOT_FOUND, response.status());
        assert_eq!("bytes", response.headers()["accept-ranges"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_directory_listing() -> io::Result<()> {
        let (_dir, files) = setup(SendOptions::default().with_directory(true)).await?;

        let response = files.serve(request(Method::GET, "/", None)).await;
        assert_eq!(StatusCode::OK, response.status());
        assert_eq!("text/html; charset=utf-8", response.headers()["content-type"]);
        assert_eq!(
            "<a href=\"/sub\">sub/</a><br><a href=\"/fixture.txt\">fixture.txt</a>",
            collect_body(response).await
        );

        let response = files.serve(request(Method::GET, "/sub/", None)).await;
        assert_eq!(
            "<a href=\"/\">..</a><br><a href=\"/sub/inner.txt\">inner.txt</a>",
            collect_body(response).await
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unsatisfiable() -> io::Result<()> {
        let (_dir, files) = setup(SendOptions::default()).await?;
        let response = files.serve(request(Method::GET, "/fixture.txt", Some("bytes=100-99"))).await;
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
        assert_eq!("bytes", response.headers()["accept-ranges"]);
        assert_eq!("bytes */62", response.headers()["content-range"]);
        assert_eq!("", collect_body(response).await);
        Ok(())
    }
}

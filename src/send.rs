use std::io;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, LAST_MODIFIED, RANGE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, ContentType, HeaderMapExt, LastModified};

use crate::config::SendOptions;
use crate::error::SendError;
use crate::file::FileSegment;
use crate::range::{parse_range_header, ByteRange};
use crate::stream::{BoxSource, BufferSource, MultiSourceStream};

const CRLF: &str = "\r\n";

/// What [`send`] decided to answer with. The response headers for the chosen
/// shape have already been written when a plan is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferPlan {
    /// The path is a directory and `format` is off; the caller decides
    /// whether to list it.
    Directory { path: String, absolute: PathBuf },
    /// `200 OK` with the whole file.
    Whole { absolute: PathBuf, size: u64 },
    /// `206 Partial Content` with one range.
    SingleRange { absolute: PathBuf, range: ByteRange, size: u64 },
    /// `206 Partial Content` with a `multipart/byteranges` body.
    Multipart {
        absolute: PathBuf,
        ranges: Vec<ByteRange>,
        size: u64,
        boundary: String,
        content_type: String,
    },
}

impl TransferPlan {
    pub fn status(&self) -> StatusCode {
        match self {
            TransferPlan::Directory { .. } | TransferPlan::Whole { .. } => StatusCode::OK,
            TransferPlan::SingleRange { .. } | TransferPlan::Multipart { .. } => StatusCode::PARTIAL_CONTENT,
        }
    }

    /// Exact number of body bytes the plan produces.
    pub fn content_length(&self) -> u64 {
        match self {
            TransferPlan::Directory { .. } => 0,
            TransferPlan::Whole { size, .. } => *size,
            TransferPlan::SingleRange { range, .. } => range.len(),
            TransferPlan::Multipart { ranges, size, boundary, content_type, .. } => {
                multipart_length(ranges, *size, boundary, content_type)
            }
        }
    }

    /// Lazily produced body. Nothing is opened until the body is polled.
    pub fn into_stream(self) -> MultiSourceStream {
        let sources: Vec<BoxSource> = match self {
            TransferPlan::Directory { .. } => Vec::new(),
            TransferPlan::Whole { absolute, size } => vec![Box::pin(FileSegment::whole(absolute, size)) as BoxSource],
            TransferPlan::SingleRange { absolute, range, .. } => vec![Box::pin(FileSegment::new(absolute, range)) as BoxSource],
            TransferPlan::Multipart { absolute, ranges, size, boundary, content_type } => {
                let mut sources: Vec<BoxSource> = Vec::with_capacity(ranges.len() * 2 + 1);
                for range in ranges {
                    let header = part_header(&boundary, &content_type, &range, size);
                    sources.push(Box::pin(BufferSource::new(header)));
                    sources.push(Box::pin(FileSegment::new(absolute.clone(), range)));
                }
                sources.push(Box::pin(BufferSource::new(closing_boundary(&boundary))));
                sources
            }
        };
        MultiSourceStream::new(sources)
    }

    pub fn into_body(self) -> Body {
        Body::new(self.into_stream())
    }
}

/// Header block preceding each part of a `multipart/byteranges` body.
pub fn part_header(boundary: &str, content_type: &str, range: &ByteRange, size: u64) -> String {
    format!(
        "{CRLF}--{boundary}{CRLF}Content-Type: {content_type}{CRLF}Content-Range: {}{CRLF}{CRLF}",
        range.content_range(size)
    )
}

/// Delimiter closing a `multipart/byteranges` body.
pub fn closing_boundary(boundary: &str) -> String {
    format!("{CRLF}--{boundary}--{CRLF}")
}

fn multipart_length(ranges: &[ByteRange], size: u64, boundary: &str, content_type: &str) -> u64 {
    let parts: u64 = ranges
        .iter()
        .map(|range| part_header(boundary, content_type, range, size).len() as u64 + range.len())
        .sum();
    parts + closing_boundary(boundary).len() as u64
}

/// Content type for a file, from its extension. Files without an extension
/// are treated as `txt`; unknown extensions are `application/octet-stream`.
pub fn content_type(path: &Path) -> mime_guess::Mime {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .unwrap_or("txt");
    mime_guess::from_ext(extension).first_or_octet_stream()
}

/// Decodes a request path and resolves `.` and `..` segments, never rising
/// above the root. Returns the normalised URL path and its segments.
pub fn normalize_path(raw: &str) -> Option<(String, Vec<String>)> {
    let decoded = urlencoding::decode(raw).ok()?;
    let mut segments: Vec<String> = Vec::new();
    for segment in decoded.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment if segment.contains('\0') => return None,
            segment => segments.push(segment.to_string()),
        }
    }
    let path = format!("/{}", segments.join("/"));
    Some((path, segments))
}

fn is_hidden(segments: &[String]) -> bool {
    segments.iter().any(|segment| segment.starts_with('.'))
}

async fn stat(absolute: &Path) -> Result<std::fs::Metadata, SendError> {
    tokio::fs::metadata(absolute).await.map_err(|e| {
        tracing::debug!(path = %absolute.display(), error = %e, "stat failed");
        SendError::NotFound
    })
}

/// Plans the response for `path` relative to `options.root` and writes its
/// headers into `response`.
///
/// `Accept-Ranges: bytes` is always written. `Last-Modified` and
/// `Cache-Control` are written unless `response` already carries them.
/// The method is not checked; only call this for `GET` and `HEAD`.
pub async fn send(
    request: &HeaderMap,
    response: &mut HeaderMap,
    path: &str,
    options: &SendOptions,
) -> Result<TransferPlan, SendError> {
    response.typed_insert(AcceptRanges::bytes());

    let (mut path, mut segments) = normalize_path(path).ok_or(SendError::NotFound)?;
    if !options.hidden && is_hidden(&segments) {
        tracing::debug!(%path, "refusing hidden path");
        return Err(SendError::NotFound);
    }

    let mut absolute = options.root.join(segments.iter().collect::<PathBuf>());
    let mut metadata = stat(&absolute).await?;

    if metadata.is_dir() {
        if !options.format {
            return Ok(TransferPlan::Directory { path, absolute });
        }
        segments.push(options.index.clone());
        path = format!("/{}", segments.join("/"));
        absolute = absolute.join(&options.index);
        metadata = stat(&absolute).await?;
        if metadata.is_dir() {
            return Err(SendError::NotFound);
        }
    }

    let size = metadata.len();
    let ranges = match request.get(RANGE) {
        Some(value) => {
            let ranges = value
                .to_str()
                .map(|text| parse_range_header(text, size))
                .unwrap_or_default();
            tracing::debug!(%path, ?ranges, size, "parsed range header");
            if ranges.is_empty() {
                return Err(SendError::RangeNotSatisfiable { size });
            }
            Some(ranges)
        }
        None => None,
    };

    if !response.contains_key(LAST_MODIFIED) {
        if let Ok(modified) = metadata.modified() {
            response.typed_insert(LastModified::from(modified));
        }
    }
    if !response.contains_key(CACHE_CONTROL) {
        let value = HeaderValue::from_str(&options.cache_control())
            .expect("cache-control directives are ascii");
        response.insert(CACHE_CONTROL, value);
    }

    let mime = content_type(&absolute);
    let plan = match ranges {
        None => {
            response.typed_insert(ContentLength(size));
            response.typed_insert(ContentType::from(mime));
            TransferPlan::Whole { absolute, size }
        }
        Some(ranges) if ranges.len() == 1 || !options.multipart => {
            let range = ranges[0];
            let content_range = ContentRange::bytes(range.start..=range.end, size)
                .expect("parsed ranges are within the resource");
            response.typed_insert(ContentLength(range.len()));
            response.typed_insert(content_range);
            response.typed_insert(ContentType::from(mime));
            TransferPlan::SingleRange { absolute, range, size }
        }
        Some(ranges) => {
            let boundary = (options.boundary)().map_err(SendError::Boundary)?;
            let header = HeaderValue::from_str(&format!("multipart/byteranges; boundary={boundary}"))
                .map_err(|_| {
                    SendError::Boundary(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("boundary {boundary:?} is not a valid header value"),
                    ))
                })?;
            let content_type = mime.to_string();
            let length = multipart_length(&ranges, size, &boundary, &content_type);
            response.typed_insert(ContentLength(length));
            response.insert(CONTENT_TYPE, header);
            TransferPlan::Multipart { absolute, ranges, size, boundary, content_type }
        }
    };

    tracing::debug!(%path, status = %plan.status(), "planned transfer");
    Ok(plan)
}

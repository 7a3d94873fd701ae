use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;

use crate::boundary::random_token;

/// Produces the boundary token for a `multipart/byteranges` response.
pub type BoundaryGenerator = Arc<dyn Fn() -> io::Result<String> + Send + Sync>;

/// Number of random bytes in the default boundary token.
pub const DEFAULT_BOUNDARY_LEN: usize = 6;

/// Options controlling how files are served. Set once, shared by every request.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    /// Directory requests are confined to. Made absolute by [`SendOptions::resolve`].
    pub root: PathBuf,
    /// Serve and list files whose path contains a segment starting with `.`.
    pub hidden: bool,
    /// Serve `index` for directory paths instead of treating them as directories.
    pub format: bool,
    /// Index file name used when `format` is set.
    pub index: String,
    /// Add `immutable` to `Cache-Control`.
    pub immutable: bool,
    /// `Cache-Control` max-age in seconds.
    pub maxage: u64,
    /// Answer multi-range requests with `multipart/byteranges`. When off only
    /// the first requested range is served.
    pub multipart: bool,
    /// Render an HTML listing for directory paths.
    pub directory: bool,
    #[serde(skip, default = "default_boundary")]
    pub boundary: BoundaryGenerator,
}

fn default_boundary() -> BoundaryGenerator {
    Arc::new(|| random_token(DEFAULT_BOUNDARY_LEN))
}

impl Default for SendOptions {
    fn default() -> Self {
        SendOptions {
            root: PathBuf::from("."),
            hidden: false,
            format: false,
            index: "index.html".to_string(),
            immutable: false,
            maxage: 0,
            multipart: true,
            directory: false,
            boundary: default_boundary(),
        }
    }
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("root", &self.root)
            .field("hidden", &self.hidden)
            .field("format", &self.format)
            .field("index", &self.index)
            .field("immutable", &self.immutable)
            .field("maxage", &self.maxage)
            .field("multipart", &self.multipart)
            .field("directory", &self.directory)
            .finish_non_exhaustive()
    }
}

impl SendOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SendOptions { root: root.into(), ..SendOptions::default() }
    }

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_format(mut self, format: bool) -> Self {
        self.format = format;
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    pub fn with_immutable(mut self, immutable: bool) -> Self {
        self.immutable = immutable;
        self
    }

    pub fn with_maxage(mut self, maxage: u64) -> Self {
        self.maxage = maxage;
        self
    }

    pub fn with_multipart(mut self, multipart: bool) -> Self {
        self.multipart = multipart;
        self
    }

    pub fn with_directory(mut self, directory: bool) -> Self {
        self.directory = directory;
        self
    }

    /// Replace the boundary token generator.
    pub fn with_boundary<F>(mut self, boundary: F) -> Self
    where
        F: Fn() -> io::Result<String> + Send + Sync + 'static,
    {
        self.boundary = Arc::new(boundary);
        self
    }

    /// Make `root` absolute against the current directory and check the
    /// index name cannot leave the directory it is appended to.
    pub fn resolve(mut self) -> io::Result<Self> {
        self.root = std::path::absolute(&self.root)?;
        if self.index.is_empty() || self.index.contains(|c: char| c == '/' || c == '\\') || self.index == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid index file name {:?}", self.index),
            ));
        }
        Ok(self)
    }

    /// `Cache-Control` value for served files.
    pub fn cache_control(&self) -> String {
        if self.immutable {
            format!("max-age={},immutable", self.maxage)
        } else {
            format!("max-age={}", self.maxage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = SendOptions::default();
        assert!(!options.hidden);
        assert!(!options.format);
        assert!(options.multipart);
        assert_eq!("index.html", options.index);
        assert_eq!("max-age=0", options.cache_control());
        assert_eq!(12, (options.boundary)().unwrap().len());
    }

    #[test]
    fn test_deserialize_fills_defaults() {
        let options: SendOptions =
            serde_json::from_str(r#"{ "root": "public", "maxage": 3600, "immutable": true }"#).unwrap();
        assert_eq!(PathBuf::from("public"), options.root);
        assert_eq!("max-age=3600,immutable", options.cache_control());
        assert!(options.multipart);
        assert_eq!("index.html", options.index);
    }

    #[test]
    fn test_resolve_makes_root_absolute() {
        let options = SendOptions::new("public").resolve().unwrap();
        assert!(options.root.is_absolute());
        assert!(options.root.ends_with("public"));
    }

    #[test]
    fn test_resolve_rejects_index_with_separator() {
        let err = SendOptions::new(".").with_index("../secret").resolve().unwrap_err();
        assert_eq!(io::ErrorKind::InvalidInput, err.kind());
    }
}

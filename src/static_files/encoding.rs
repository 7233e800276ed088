//! Precompressed variant negotiation.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;

use crate::http::handler::BoxFuture;

/// Encodings with a sibling-file convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Brotli,
    Gzip,
}

impl Encoding {
    /// Parse a configuration token (`br`, `gzip`).
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "br" => Some(Self::Brotli),
            "gzip" => Some(Self::Gzip),
            _ => None,
        }
    }

    /// `Content-Encoding` token.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Brotli => "br",
            Self::Gzip => "gzip",
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Self::Brotli => ".br",
            Self::Gzip => ".gz",
        }
    }

    /// `<path>.br` or `<path>.gz`.
    pub fn sibling_of(&self, path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(self.suffix());
        PathBuf::from(name)
    }
}

/// A compressed file to serve instead of the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub path: PathBuf,
    /// `Content-Encoding` value, also used as the ETag suffix.
    pub encoding: String,
}

/// Custom variant lookup, replacing sibling probing.
pub trait VariantResolver: Send + Sync {
    fn resolve<'a>(&'a self, path: &'a Path, accept_encoding: Option<&'a str>) -> BoxFuture<'a, Option<Variant>>;
}

/// Parsed `Accept-Encoding` weights.
#[derive(Debug, Default, Clone)]
pub struct AcceptEncoding {
    weights: HashMap<String, f32>,
}

impl AcceptEncoding {
    /// Parse `gzip, br;q=0.5, *;q=0`. Unparseable weights count as 1.
    pub fn parse(header: Option<&str>) -> Self {
        let mut weights = HashMap::new();
        for item in header.unwrap_or_default().split(',') {
            let mut parts = item.split(';');
            let coding = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
            if coding.is_empty() {
                continue;
            }
            let mut q = 1.0;
            for param in parts {
                if let Some((key, value)) = param.split_once('=') {
                    if key.trim().eq_ignore_ascii_case("q") {
                        if let Ok(parsed) = value.trim().parse::<f32>() {
                            q = parsed;
                        }
                    }
                }
            }
            weights.insert(coding, q);
        }
        Self { weights }
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Explicit weight, else the `*` weight.
    pub fn weight(&self, coding: &str) -> Option<f32> {
        self.weights
            .get(coding)
            .or_else(|| self.weights.get("*"))
            .copied()
    }

    /// The client named this coding (directly or via `*`) with a non-zero weight.
    pub fn permits(&self, coding: &str) -> bool {
        self.weight(coding).is_some_and(|q| q > 0.0)
    }
}

/// First sibling in `prefer` order that the client accepts and that exists.
pub(crate) async fn probe_siblings(path: &Path, prefer: &[Encoding], accepted: &AcceptEncoding) -> Option<Variant> {
    if accepted.is_empty() {
        return None;
    }
    for encoding in prefer {
        if !accepted.permits(encoding.token()) {
            continue;
        }
        let candidate = encoding.sibling_of(path);
        match fs::metadata(&candidate).await {
            Ok(meta) if meta.is_file() => {
                return Some(Variant {
                    path: candidate,
                    encoding: encoding.token().to_string(),
                })
            }
            _ => continue,
        }
    }
    None
}

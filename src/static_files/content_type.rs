//! Extension → content type resolution.

use std::collections::HashMap;
use std::fs::Metadata;
use std::path::Path;
use std::sync::Arc;

use crate::config::schema::StaticServeConfig;

const BUILTIN: &[(&str, &str)] = &[
    (".html", "text/html; charset=utf-8"),
    (".json", "application/json; charset=utf-8"),
    (".txt", "text/plain; charset=utf-8"),
    (".js", "application/javascript; charset=utf-8"),
    (".css", "text/css; charset=utf-8"),
    (".png", "image/png"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".webp", "image/webp"),
    (".gif", "image/gif"),
    (".svg", "image/svg+xml"),
    (".mp4", "video/mp4"),
    (".webm", "video/webm"),
    (".mp3", "audio/mpeg"),
    (".wav", "audio/wav"),
];

/// Custom resolver: `(extension, path, metadata)` → content type.
///
/// The extension is lowercase with its leading dot, or empty.
pub type ContentTypeResolver = Arc<dyn Fn(&str, &Path, &Metadata) -> Option<String> + Send + Sync>;

/// Content type table with overrides and charset defaulting.
#[derive(Clone)]
pub struct ContentTypes {
    table: HashMap<String, String>,
    resolver: Option<ContentTypeResolver>,
    default_type: String,
    charset: Option<String>,
}

impl ContentTypes {
    pub fn from_config(config: &StaticServeConfig) -> Self {
        let mut table: HashMap<String, String> = BUILTIN
            .iter()
            .map(|(ext, ty)| (ext.to_string(), ty.to_string()))
            .collect();
        for (ext, ty) in &config.content_types {
            table.insert(normalize_extension(ext), ty.clone());
        }

        let charset = config.default_text_charset.trim();
        Self {
            table,
            resolver: None,
            default_type: config.default_content_type.clone(),
            charset: (!charset.is_empty()).then(|| charset.to_string()),
        }
    }

    /// Consult `resolver` before the extension table.
    pub fn with_resolver(mut self, resolver: ContentTypeResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Resolve the `Content-Type` value for a file.
    pub fn resolve(&self, path: &Path, meta: &Metadata) -> String {
        let ext = extension_of(path);
        let base = self
            .resolver
            .as_ref()
            .and_then(|resolve| resolve(&ext, path, meta))
            .or_else(|| self.table.get(&ext).cloned())
            .unwrap_or_else(|| self.default_type.clone());
        self.with_charset(base)
    }

    fn with_charset(&self, content_type: String) -> String {
        let Some(charset) = &self.charset else {
            return content_type;
        };
        let lower = content_type.to_ascii_lowercase();
        let textual = lower.starts_with("text/") || lower.starts_with("application/json");
        if textual && !has_charset(&lower) {
            format!("{content_type}; charset={charset}")
        } else {
            content_type
        }
    }
}

impl std::fmt::Debug for ContentTypes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentTypes")
            .field("entries", &self.table.len())
            .field("custom_resolver", &self.resolver.is_some())
            .field("default_type", &self.default_type)
            .field("charset", &self.charset)
            .finish()
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn has_charset(lower: &str) -> bool {
    lower
        .split(';')
        .skip(1)
        .any(|param| param.trim_start().starts_with("charset="))
}

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Per-request limits.
    pub limits: LimitsConfig,

    /// Static file index and responder settings.
    pub static_files: StaticFilesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Request limits handed to handlers and enforced by the transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 16 * 1024,
        }
    }
}

/// Static file serving.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Register the static matcher.
    pub enabled: bool,

    /// Directory to index.
    pub root_dir: PathBuf,

    /// URL prefix files are published under.
    pub url_base: String,

    /// Periodic rebuild interval; `None` builds once.
    pub scan_interval_ms: Option<u64>,

    /// Follow symlinks that stay inside the root.
    pub follow_symlinks: bool,

    /// Stop indexing after this many files.
    pub max_files: Option<usize>,

    /// Do not descend deeper than this (root is depth 0).
    pub max_depth: Option<usize>,

    /// Admit the `.well-known` directory despite the dotfile rule.
    pub allow_well_known: bool,

    /// Files that answer for their directory URL, in priority order.
    pub index_files: Vec<String>,

    /// Rebuild on filesystem change notifications.
    pub watch: bool,

    /// Responder settings.
    pub serve: StaticServeConfig,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root_dir: PathBuf::from("public"),
            url_base: "/".to_string(),
            scan_interval_ms: None,
            follow_symlinks: false,
            max_files: None,
            max_depth: None,
            allow_well_known: false,
            index_files: vec!["index.html".to_string(), "index.htm".to_string()],
            watch: false,
            serve: StaticServeConfig::default(),
        }
    }
}

/// Content negotiation for served files.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticServeConfig {
    /// Extension overrides, e.g. `{ "md" = "text/markdown" }`.
    pub content_types: HashMap<String, String>,

    /// Type for unknown extensions.
    pub default_content_type: String,

    /// Charset appended to text and JSON types; empty disables.
    pub default_text_charset: String,

    pub precompressed: PrecompressedConfig,
}

impl Default for StaticServeConfig {
    fn default() -> Self {
        Self {
            content_types: HashMap::new(),
            default_content_type: "application/octet-stream".to_string(),
            default_text_charset: "utf-8".to_string(),
            precompressed: PrecompressedConfig::default(),
        }
    }
}

/// Precompressed sibling (`.br`, `.gz`) negotiation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PrecompressedConfig {
    pub enabled: bool,

    /// Encodings to probe, most preferred first (`br`, `gzip`).
    pub prefer: Vec<String>,

    /// Probe `<file>.br` / `<file>.gz` next to the original.
    pub use_sibling_files: bool,

    /// Honor `Range` on compressed variants.
    pub allow_ranges_for_compressed: bool,

    /// Send `Vary: Accept-Encoding` on every response.
    pub always_set_vary: bool,
}

impl Default for PrecompressedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prefer: vec!["br".to_string(), "gzip".to_string()],
            use_sibling_files: true,
            allow_ranges_for_compressed: false,
            always_set_vary: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

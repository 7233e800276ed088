//! Static file subsystem.
//!
//! # Data Flow
//! ```text
//! root_dir
//!     → walk.rs (async walk, symlink and hidden-file policy)
//!     → index.rs (Snapshot published through ArcSwap)
//!     → watcher.rs / interval (rebuild triggers)
//!
//! Per request (via routing::StaticFileMatcher):
//!     URL path → StaticIndex::resolve_url → absolute path
//!     → serve.rs (content_type.rs, encoding.rs, range.rs)
//! ```

pub mod content_type;
pub mod encoding;
pub mod index;
pub mod range;
pub mod serve;
mod walk;
mod watcher;

use std::path::PathBuf;

use thiserror::Error;

pub use content_type::{ContentTypeResolver, ContentTypes};
pub use encoding::{Encoding, Variant, VariantResolver};
pub use index::{IndexSettings, Snapshot, StaticIndex};
pub use serve::{serve_file, ServeSettings};

/// Failures starting the index background machinery.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Failed to watch {path:?}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

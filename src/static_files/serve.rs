//! File responses: validators, negotiation, ranges and streaming.
//!
//! # Response Flow
//! ```text
//! stat original → Content-Type / Last-Modified / nosniff
//!     → precompressed variant (resolver or sibling probe)
//!     → weak ETag → If-None-Match → 304
//!     → Range → 206 | 416, or 200
//!     → HEAD stops before the body
//! ```

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::config::schema::StaticServeConfig;
use crate::http::context::RequestContext;
use crate::http::error::{HttpError, HttpResult};
use crate::static_files::content_type::{ContentTypeResolver, ContentTypes};
use crate::static_files::encoding::{probe_siblings, AcceptEncoding, Encoding, VariantResolver};
use crate::static_files::range::ByteRange;

struct Precompression {
    prefer: Vec<Encoding>,
    use_sibling_files: bool,
    allow_ranges_for_compressed: bool,
    always_set_vary: bool,
    resolver: Option<Arc<dyn VariantResolver>>,
}

/// Everything the file responder needs besides the path.
pub struct ServeSettings {
    content_types: ContentTypes,
    precompression: Option<Precompression>,
}

impl ServeSettings {
    pub fn from_config(config: &StaticServeConfig) -> Self {
        let pre = &config.precompressed;
        let precompression = pre.enabled.then(|| Precompression {
            prefer: pre
                .prefer
                .iter()
                .filter_map(|token| {
                    let encoding = Encoding::from_token(token);
                    if encoding.is_none() {
                        tracing::warn!(encoding = %token, "Ignoring unknown precompressed encoding");
                    }
                    encoding
                })
                .collect(),
            use_sibling_files: pre.use_sibling_files,
            allow_ranges_for_compressed: pre.allow_ranges_for_compressed,
            always_set_vary: pre.always_set_vary,
            resolver: None,
        });

        Self {
            content_types: ContentTypes::from_config(config),
            precompression,
        }
    }

    pub fn with_content_type_resolver(self, resolver: ContentTypeResolver) -> Self {
        let content_types = self.content_types.with_resolver(resolver);
        Self { content_types, ..self }
    }

    /// Replace sibling probing. Has no effect unless precompression is enabled.
    pub fn with_variant_resolver(mut self, resolver: Arc<dyn VariantResolver>) -> Self {
        if let Some(pre) = self.precompression.as_mut() {
            pre.resolver = Some(resolver);
        }
        self
    }

    fn ranges_for_compressed(&self) -> bool {
        self.precompression
            .as_ref()
            .is_some_and(|pre| pre.allow_ranges_for_compressed)
    }
}

impl std::fmt::Debug for ServeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServeSettings")
            .field("content_types", &self.content_types)
            .field("precompression", &self.precompression.as_ref().map(|pre| &pre.prefer))
            .finish()
    }
}

/// Stage a response for `path` on `ctx`.
pub async fn serve_file(ctx: &mut RequestContext, path: &Path, settings: &ServeSettings) -> HttpResult {
    let meta = stat(path).await?;
    let head = *ctx.method() == Method::HEAD;

    ctx.header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
    if let Ok(modified) = meta.modified() {
        ctx.header(header::LAST_MODIFIED, http_date(modified));
    }
    ctx.header(header::CONTENT_TYPE, settings.content_types.resolve(path, &meta));

    let mut body_path: PathBuf = path.to_path_buf();
    let mut body_meta = meta;
    let mut encoding = None;

    if let Some(pre) = &settings.precompression {
        let accept = ctx.header_str(&header::ACCEPT_ENCODING).map(str::to_owned);
        if pre.always_set_vary {
            ctx.header(header::VARY, "Accept-Encoding");
        }

        let variant = match &pre.resolver {
            Some(resolver) => resolver.resolve(path, accept.as_deref()).await,
            None if pre.use_sibling_files => {
                probe_siblings(path, &pre.prefer, &AcceptEncoding::parse(accept.as_deref())).await
            }
            None => None,
        };

        if let Some(variant) = variant {
            body_meta = stat(&variant.path).await?;
            ctx.header(header::CONTENT_ENCODING, variant.encoding.as_str());
            body_path = variant.path;
            encoding = Some(variant.encoding);
        }
    }

    let size = body_meta.len();
    let etag = weak_etag(size, body_meta.modified().ok(), encoding.as_deref());
    ctx.header(header::ETAG, etag.as_str());

    if ctx
        .header_str(&header::IF_NONE_MATCH)
        .is_some_and(|value| etag_matches(value, &etag))
    {
        ctx.status(StatusCode::NOT_MODIFIED).end();
        return Ok(());
    }

    if encoding.is_none() || settings.ranges_for_compressed() {
        ctx.header(header::ACCEPT_RANGES, "bytes");
        let range = ByteRange::evaluate(ctx.header_str(&header::RANGE), size);
        match range {
            ByteRange::Full => {}
            ByteRange::Unsatisfiable => {
                ctx.status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::CONTENT_RANGE, format!("bytes */{size}"))
                    .end();
                return Ok(());
            }
            ByteRange::Partial { start, end } => {
                let len = end - start + 1;
                ctx.status(StatusCode::PARTIAL_CONTENT)
                    .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"))
                    .header(header::CONTENT_LENGTH, len);
                if head {
                    ctx.end();
                } else {
                    let body = open_span(&body_path, start, len).await?;
                    ctx.stream(body);
                }
                return Ok(());
            }
        }
    } else {
        ctx.header(header::ACCEPT_RANGES, "none");
    }

    ctx.status(StatusCode::OK).header(header::CONTENT_LENGTH, size);
    if head {
        ctx.end();
    } else {
        let body = open_span(&body_path, 0, size).await?;
        ctx.stream(body);
    }
    Ok(())
}

async fn stat(path: &Path) -> HttpResult<std::fs::Metadata> {
    fs::metadata(path).await.map_err(|e| file_error(path, e))
}

/// Files that disappeared since indexing answer 404.
fn file_error(path: &Path, e: io::Error) -> HttpError {
    if e.kind() == io::ErrorKind::NotFound {
        tracing::debug!(path = ?path, "Indexed file vanished");
        HttpError::not_found()
    } else {
        HttpError::from(e)
    }
}

async fn open_span(path: &Path, start: u64, len: u64) -> HttpResult<Body> {
    let mut file = File::open(path).await.map_err(|e| file_error(path, e))?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }

    let shown = path.display().to_string();
    let stream = ReaderStream::new(file.take(len)).inspect_err(move |e| {
        tracing::warn!(path = %shown, error = %e, "File stream aborted");
    });
    Ok(Body::from_stream(stream))
}

/// `W/"size-mtimeMs"` or `W/"size-mtimeMs-encoding"`.
fn weak_etag(size: u64, modified: Option<SystemTime>, encoding: Option<&str>) -> String {
    let millis = modified
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis());
    match encoding {
        Some(encoding) => format!("W/\"{size}-{millis}-{encoding}\""),
        None => format!("W/\"{size}-{millis}\""),
    }
}

fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == etag || candidate == "*")
}

fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PrecompressedConfig;
    use crate::http::handler::BoxFuture;
    use crate::routing::test_support::{body_string, request};
    use crate::static_files::encoding::Variant;
    use axum::http::HeaderMap;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hello world").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('plain')").unwrap();
        std::fs::write(dir.path().join("app.js.br"), "BR").unwrap();
        std::fs::write(dir.path().join("app.js.gz"), "GZIP").unwrap();
        dir
    }

    fn plain() -> ServeSettings {
        ServeSettings::from_config(&StaticServeConfig::default())
    }

    fn compressed(tweak: impl FnOnce(&mut PrecompressedConfig)) -> ServeSettings {
        let mut config = StaticServeConfig::default();
        config.precompressed.enabled = true;
        tweak(&mut config.precompressed);
        ServeSettings::from_config(&config)
    }

    async fn serve(
        method: &str,
        headers: &[(&str, &str)],
        path: &Path,
        settings: &ServeSettings,
    ) -> HttpResult<(StatusCode, HeaderMap, String)> {
        let mut req = request(method, "/file");
        for (name, value) in headers {
            req.headers_mut().insert(
                header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        let mut ctx = RequestContext::from_request(req).unwrap();
        serve_file(&mut ctx, path, settings).await?;
        let (parts, body) = ctx.take_response().into_parts();
        Ok((parts.status, parts.headers, body_string(body).await))
    }

    #[tokio::test]
    async fn test_full_file_with_validators() {
        let dir = site();
        let path = dir.path().join("hello.txt");
        let (status, headers, body) = serve("GET", &[], &path, &plain()).await.unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello world");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        assert_eq!(headers[header::CONTENT_LENGTH], "11");
        assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert!(headers[header::ETAG].to_str().unwrap().starts_with("W/\"11-"));
        assert!(headers[header::LAST_MODIFIED].to_str().unwrap().ends_with(" GMT"));
        assert!(!headers.contains_key(header::VARY));
    }

    #[tokio::test]
    async fn test_head_has_headers_only() {
        let dir = site();
        let path = dir.path().join("hello.txt");
        let (status, headers, body) = serve("HEAD", &[], &path, &plain()).await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_LENGTH], "11");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_matching_etag_is_not_modified() {
        let dir = site();
        let path = dir.path().join("hello.txt");
        let (_, headers, _) = serve("GET", &[], &path, &plain()).await.unwrap();
        let etag = headers[header::ETAG].to_str().unwrap().to_string();

        let (status, _, body) = serve("GET", &[("if-none-match", etag.as_str())], &path, &plain())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NOT_MODIFIED);
        assert!(body.is_empty());

        let listed = format!("W/\"0-0\", {etag}");
        let (status, _, _) = serve("GET", &[("if-none-match", listed.as_str())], &path, &plain())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NOT_MODIFIED);

        let (status, _, _) = serve("GET", &[("if-none-match", "W/\"1-1\"")], &path, &plain())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_partial_and_unsatisfiable_ranges() {
        let dir = site();
        let path = dir.path().join("hello.txt");

        let (status, headers, body) = serve("GET", &[("range", "bytes=0-4")], &path, &plain())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(body, "hello");
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-4/11");
        assert_eq!(headers[header::CONTENT_LENGTH], "5");

        let (_, _, body) = serve("GET", &[("range", "bytes=6-")], &path, &plain()).await.unwrap();
        assert_eq!(body, "world");

        let (status, headers, body) = serve("GET", &[("range", "bytes=20-")], &path, &plain())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(headers[header::CONTENT_RANGE], "bytes */11");
        assert!(body.is_empty());

        let (status, headers, body) = serve("HEAD", &[("range", "bytes=0-4")], &path, &plain())
            .await
            .unwrap();
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers[header::CONTENT_LENGTH], "5");
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_precompressed_sibling_is_preferred() {
        let dir = site();
        let path = dir.path().join("app.js");
        let settings = compressed(|_| {});

        let (status, headers, body) = serve("GET", &[("accept-encoding", "gzip, br")], &path, &settings)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "BR");
        assert_eq!(headers[header::CONTENT_ENCODING], "br");
        assert_eq!(headers[header::CONTENT_TYPE], "application/javascript; charset=utf-8");
        assert_eq!(headers[header::VARY], "Accept-Encoding");
        assert_eq!(headers[header::ACCEPT_RANGES], "none");
        assert!(headers[header::ETAG].to_str().unwrap().ends_with("-br\""));

        let (_, headers, body) = serve("GET", &[("accept-encoding", "gzip")], &path, &settings)
            .await
            .unwrap();
        assert_eq!(body, "GZIP");
        assert_eq!(headers[header::CONTENT_ENCODING], "gzip");
    }

    #[tokio::test]
    async fn test_precompressed_falls_back_to_original() {
        let dir = site();
        let settings = compressed(|_| {});

        let path = dir.path().join("app.js");
        let (_, headers, body) = serve("GET", &[("accept-encoding", "br;q=0, gzip;q=0")], &path, &settings)
            .await
            .unwrap();
        assert_eq!(body, "console.log('plain')");
        assert!(!headers.contains_key(header::CONTENT_ENCODING));
        assert_eq!(headers[header::VARY], "Accept-Encoding");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");

        let path = dir.path().join("hello.txt");
        let (_, headers, _) = serve("GET", &[("accept-encoding", "br")], &path, &settings)
            .await
            .unwrap();
        assert!(!headers.contains_key(header::CONTENT_ENCODING));
    }

    #[tokio::test]
    async fn test_ranges_on_compressed_when_allowed() {
        let dir = site();
        let path = dir.path().join("app.js");
        let settings = compressed(|pre| pre.allow_ranges_for_compressed = true);

        let (status, headers, body) = serve(
            "GET",
            &[("accept-encoding", "gzip"), ("range", "bytes=1-2")],
            &path,
            &settings,
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(body, "ZI");
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 1-2/4");
    }

    struct Fixed(PathBuf);

    impl VariantResolver for Fixed {
        fn resolve<'a>(&'a self, _path: &'a Path, _accept: Option<&'a str>) -> BoxFuture<'a, Option<Variant>> {
            Box::pin(async move {
                Some(Variant {
                    path: self.0.clone(),
                    encoding: "zstd".to_string(),
                })
            })
        }
    }

    #[tokio::test]
    async fn test_custom_variant_resolver_is_always_consulted() {
        let dir = site();
        let path = dir.path().join("app.js");
        let settings = compressed(|_| {}).with_variant_resolver(Arc::new(Fixed(dir.path().join("app.js.gz"))));

        let (_, headers, body) = serve("GET", &[], &path, &settings).await.unwrap();
        assert_eq!(body, "GZIP");
        assert_eq!(headers[header::CONTENT_ENCODING], "zstd");
    }

    #[tokio::test]
    async fn test_vanished_file_is_not_found() {
        let dir = site();
        let path = dir.path().join("gone.txt");
        let err = serve("GET", &[], &path, &plain()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_etag_and_date_format() {
        let t = UNIX_EPOCH + std::time::Duration::from_millis(1_500);
        assert_eq!(weak_etag(10, Some(t), None), "W/\"10-1500\"");
        assert_eq!(weak_etag(10, Some(t), Some("br")), "W/\"10-1500-br\"");
        assert_eq!(http_date(UNIX_EPOCH), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert!(etag_matches("*", "W/\"1-1\""));
    }
}

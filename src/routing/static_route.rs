//! Static file matcher (`STATIC`).
//!
//! Matches GET and HEAD requests whose path resolves through a
//! [`StaticIndex`]. Serving itself lives in `static_files::serve`.
//!
//! The matcher is active as soon as it is registered. One optional rule may
//! narrow its methods and attach pipes.

use std::fmt;
use std::sync::Arc;

use crate::config::schema::StaticServeConfig;
use crate::http::context::Context;
use crate::http::error::HttpResult;
use crate::http::handler::{run_pipes, BoxFuture, Pipe};
use crate::http::method::Method;
use crate::http::path::{decode_path, has_dot_dot_segment};
use crate::routing::matcher::{Matcher, Respond, Responder};
use crate::routing::rule::{RouteRule, RuleTarget};
use crate::routing::SetupError;
use crate::static_files::{serve_file, ServeSettings, StaticIndex};

const SERVED: [Method; 2] = [Method::Get, Method::Head];

/// Serves files from a shared index.
pub struct StaticFileMatcher<C> {
    name: String,
    index: Arc<StaticIndex>,
    settings: Arc<ServeSettings>,
    methods: Vec<Method>,
    pipes: Arc<Vec<Pipe<C>>>,
    configured: bool,
}

impl<C: Context> StaticFileMatcher<C> {
    pub const TYPE_NAME: &'static str = "STATIC";

    pub fn new(index: Arc<StaticIndex>, config: &StaticServeConfig) -> Self {
        Self::with_settings(index, ServeSettings::from_config(config))
    }

    /// Use prepared settings, e.g. with custom resolvers attached.
    pub fn with_settings(index: Arc<StaticIndex>, settings: ServeSettings) -> Self {
        Self {
            name: Self::TYPE_NAME.to_string(),
            index,
            settings: Arc::new(settings),
            methods: SERVED.to_vec(),
            pipes: Arc::new(Vec::new()),
            configured: false,
        }
    }

    /// Register under a custom type name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn index(&self) -> &Arc<StaticIndex> {
        &self.index
    }

    fn serves(&self, method: Method) -> bool {
        self.methods.contains(&method) || (method == Method::Head && self.methods.contains(&Method::Get))
    }
}

impl<C> fmt::Debug for StaticFileMatcher<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticFileMatcher")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("methods", &self.methods)
            .field("pipes", &self.pipes.len())
            .finish()
    }
}

/// The raw target, decoded when possible, contains a `..` segment.
fn raw_traversal(raw_path: &str) -> bool {
    let decoded = decode_path(raw_path).unwrap_or_else(|| raw_path.to_string());
    has_dot_dot_segment(&decoded)
}

impl<C: Context> Matcher<C> for StaticFileMatcher<C> {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn add_rule(&mut self, mut rule: RouteRule<C>) -> Result<(), SetupError> {
        if *rule.target() != RuleTarget::Static {
            return Err(SetupError::RuleMismatch {
                route_type: self.name.clone(),
                target: format!("{:?}", rule.target()),
            });
        }
        if self.configured {
            return Err(SetupError::DuplicateRule(self.name.clone()));
        }

        let methods = rule.declared_methods().map_or_else(|| SERVED.to_vec(), <[Method]>::to_vec);
        if let Some(method) = methods.iter().find(|m| !SERVED.contains(m)) {
            return Err(SetupError::UnsupportedMethod(method.to_string()));
        }

        self.methods = methods;
        self.pipes = Arc::new(rule.take_pipes());
        self.configured = true;
        Ok(())
    }

    fn match_request(&self, ctx: &C) -> Option<Responder<C>> {
        let core = ctx.core();
        let method = Method::from_http(core.method())?;
        if !self.serves(method) || raw_traversal(core.uri().path()) {
            return None;
        }

        let path = self.index.resolve_url(core.path())?;
        Some(Box::new(FileResponder {
            path,
            settings: self.settings.clone(),
            pipes: self.pipes.clone(),
        }))
    }
}

struct FileResponder<C> {
    path: std::path::PathBuf,
    settings: Arc<ServeSettings>,
    pipes: Arc<Vec<Pipe<C>>>,
}

impl<C: Context> Respond<C> for FileResponder<C> {
    fn respond<'a>(self: Box<Self>, ctx: &'a mut C) -> BoxFuture<'a, HttpResult> {
        Box::pin(async move {
            run_pipes(&self.pipes, ctx).await?;
            serve_file(ctx.core_mut(), &self.path, &self.settings).await
        })
    }
}

//! Pattern compilation.
//!
//! `/users/:id(\d+)/files/*path` becomes
//! `[Static("users"), Param{id, /^(?:\d+)$/}, Static("files"), Wildcard("path")]`.

use std::collections::HashMap;

use crate::http::path::normalize_path;
use crate::routing::pattern::constraint::Constraint;
use crate::routing::SetupError;

/// Name bound by a bare `*`.
pub const DEFAULT_WILDCARD: &str = "wild";

#[derive(Debug, Clone)]
pub(crate) enum Token {
    Static(String),
    Param {
        name: String,
        constraint: Option<Constraint>,
    },
    Wildcard(String),
}

/// Compile a pattern; `constraints` supplies validators for params without
/// an inline regex.
pub(crate) fn parse_pattern(
    pattern: &str,
    constraints: &HashMap<String, Constraint>,
) -> Result<Vec<Token>, SetupError> {
    let normalized = normalize_path(pattern);
    if normalized == "/" {
        return Ok(Vec::new());
    }

    let body = normalized.strip_prefix('/').unwrap_or(normalized);
    let segments: Vec<&str> = body.split('/').collect();
    let mut tokens = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        if segment.starts_with(':') {
            let (name, inline) = split_param(segment)
                .ok_or_else(|| SetupError::InvalidParamSegment(segment.to_string()))?;

            let constraint = match inline {
                Some(source) => Some(Constraint::inline(source).map_err(|e| {
                    SetupError::InvalidConstraint {
                        param: name.to_string(),
                        reason: e.to_string(),
                    }
                })?),
                None => constraints.get(name).cloned(),
            };

            tokens.push(Token::Param {
                name: name.to_string(),
                constraint,
            });
        } else if let Some(name) = segment.strip_prefix('*') {
            if i + 1 != segments.len() {
                return Err(SetupError::WildcardNotLast(pattern.to_string()));
            }
            let name = if name.is_empty() { DEFAULT_WILDCARD } else { name };
            tokens.push(Token::Wildcard(name.to_string()));
        } else {
            tokens.push(Token::Static(segment.to_string()));
        }
    }

    Ok(tokens)
}

/// Split `:name` or `:name(inline)`. The name is an identifier.
fn split_param(segment: &str) -> Option<(&str, Option<&str>)> {
    let body = segment.strip_prefix(':')?;
    let (name, inline) = match body.find('(') {
        Some(open) => {
            let inner = body[open + 1..].strip_suffix(')')?;
            if inner.is_empty() {
                return None;
            }
            (&body[..open], Some(inner))
        }
        None => (body, None),
    };

    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some((name, inline))
    } else {
        None
    }
}

//! Segment trie with backtracking lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::http::context::Params;
use crate::http::handler::SharedHandler;
use crate::http::method::Method;
use crate::routing::pattern::constraint::Constraint;
use crate::routing::pattern::parse::Token;
use crate::routing::SetupError;

struct ParamEdge<C> {
    name: Arc<str>,
    constraint: Option<Constraint>,
    node: Node<C>,
}

struct WildcardEdge<C> {
    name: Arc<str>,
    node: Node<C>,
}

pub(crate) struct Node<C> {
    statics: HashMap<String, Node<C>>,
    param: Option<Box<ParamEdge<C>>>,
    wildcard: Option<Box<WildcardEdge<C>>>,
    handlers: HashMap<Method, SharedHandler<C>>,
}

impl<C> Default for Node<C> {
    fn default() -> Self {
        Self {
            statics: HashMap::new(),
            param: None,
            wildcard: None,
            handlers: HashMap::new(),
        }
    }
}

/// A found handler and whether it is a GET handler answering HEAD.
pub(crate) struct Hit<C> {
    pub handler: SharedHandler<C>,
    pub params: Params,
    pub head_fallback: bool,
}

fn constraint_signature(constraint: &Option<Constraint>) -> String {
    constraint
        .as_ref()
        .map(Constraint::signature)
        .unwrap_or_else(|| "unconstrained".to_string())
}

impl<C> Node<C> {
    /// Insert a handler at the end of `tokens`.
    pub(crate) fn insert(
        &mut self,
        pattern: &str,
        tokens: &[Token],
        method: Method,
        handler: SharedHandler<C>,
    ) -> Result<(), SetupError> {
        let mut node = self;

        for token in tokens {
            node = match token {
                Token::Static(segment) => node.statics.entry(segment.clone()).or_default(),
                Token::Param { name, constraint } => {
                    let edge = node.param.get_or_insert_with(|| {
                        Box::new(ParamEdge {
                            name: Arc::from(name.as_str()),
                            constraint: constraint.clone(),
                            node: Node::default(),
                        })
                    });
                    // An unconstrained param reuses the edge and its validator.
                    let existing = format!("{}{}", edge.name, constraint_signature(&edge.constraint));
                    let new = format!("{}{}", name, constraint_signature(constraint));
                    let renamed = &*edge.name != name.as_str();
                    if renamed || (constraint.is_some() && existing != new) {
                        return Err(SetupError::ConflictingSegment {
                            kind: "parameter",
                            pattern: pattern.to_string(),
                            existing,
                            new,
                        });
                    }
                    &mut edge.node
                }
                Token::Wildcard(name) => {
                    let edge = node.wildcard.get_or_insert_with(|| {
                        Box::new(WildcardEdge {
                            name: Arc::from(name.as_str()),
                            node: Node::default(),
                        })
                    });
                    if &*edge.name != name.as_str() {
                        return Err(SetupError::ConflictingSegment {
                            kind: "wildcard",
                            pattern: pattern.to_string(),
                            existing: edge.name.to_string(),
                            new: name.clone(),
                        });
                    }
                    &mut edge.node
                }
            };
        }

        if node.handlers.contains_key(&method) {
            return Err(SetupError::DuplicateHandler {
                method: method.to_string(),
                pattern: pattern.to_string(),
            });
        }
        node.handlers.insert(method, handler);
        Ok(())
    }

    /// Handler for a method, reusing GET for HEAD.
    fn handler_for(&self, method: Option<Method>) -> Option<(SharedHandler<C>, bool)> {
        let method = method?;
        if let Some(handler) = self.handlers.get(&method) {
            return Some((handler.clone(), false));
        }
        if method == Method::Head {
            return self.handlers.get(&Method::Get).map(|h| (h.clone(), true));
        }
        None
    }

    /// Match decoded segments below the root.
    ///
    /// An empty slice means the root path.
    pub(crate) fn lookup(&self, method: Option<Method>, segments: &[String]) -> Option<Hit<C>> {
        if segments.is_empty() {
            if let Some((handler, head_fallback)) = self.handler_for(method) {
                return Some(Hit {
                    handler,
                    params: Params::new(),
                    head_fallback,
                });
            }
            let edge = self.wildcard.as_ref()?;
            let (handler, head_fallback) = edge.node.handler_for(method)?;
            let mut params = Params::new();
            params.insert(edge.name.to_string(), String::new());
            return Some(Hit {
                handler,
                params,
                head_fallback,
            });
        }

        let mut bindings = Vec::new();
        let (handler, head_fallback) = self.descend(method, segments, 0, &mut bindings)?;
        let params = bindings
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        Some(Hit {
            handler,
            params,
            head_fallback,
        })
    }

    /// Static beats parameter beats wildcard at every level. A failed
    /// parameter branch pops its binding before the wildcard is tried.
    fn descend(
        &self,
        method: Option<Method>,
        segments: &[String],
        index: usize,
        bindings: &mut Vec<(Arc<str>, String)>,
    ) -> Option<(SharedHandler<C>, bool)> {
        if index == segments.len() {
            return self.handler_for(method);
        }
        let segment = &segments[index];

        if let Some(child) = self.statics.get(segment.as_str()) {
            if let Some(found) = child.descend(method, segments, index + 1, bindings) {
                return Some(found);
            }
        }

        if let Some(edge) = &self.param {
            let accepted = edge
                .constraint
                .as_ref()
                .map(|c| c.accepts(segment))
                .unwrap_or(true);
            if accepted {
                bindings.push((edge.name.clone(), segment.clone()));
                if let Some(found) = edge.node.descend(method, segments, index + 1, bindings) {
                    return Some(found);
                }
                bindings.pop();
            }
        }

        if let Some(edge) = &self.wildcard {
            if let Some(found) = edge.node.handler_for(method) {
                bindings.push((edge.name.clone(), segments[index..].join("/")));
                return Some(found);
            }
        }

        None
    }
}

//! Parameter constraints.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Validation applied to a decoded parameter segment.
#[derive(Clone)]
pub enum Constraint {
    /// Optional minus sign followed by ASCII digits.
    Int,
    /// Hyphenated RFC 4122 UUID, versions 1 to 5, any case.
    Uuid,
    /// ASCII hex digits, any case.
    Hex,
    /// ASCII letters.
    Alpha,
    /// Regex tested against the segment. Anchor it yourself if needed.
    Regex(Regex),
    Predicate(Predicate),
}

impl Constraint {
    /// Look up a built-in constraint by name.
    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Self::Int),
            "uuid" => Some(Self::Uuid),
            "hex" => Some(Self::Hex),
            "alpha" => Some(Self::Alpha),
            _ => None,
        }
    }

    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        Regex::new(source).map(Self::Regex)
    }

    pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Inline `:name(re)` constraints must match the whole segment.
    pub(crate) fn inline(source: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{source})$")).map(Self::Regex)
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Int => {
                let digits = value.strip_prefix('-').unwrap_or(value);
                !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
            }
            Self::Uuid => is_uuid(value),
            Self::Hex => !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit()),
            Self::Alpha => !value.is_empty() && value.bytes().all(|b| b.is_ascii_alphabetic()),
            Self::Regex(re) => re.is_match(value),
            Self::Predicate(f) => f(value),
        }
    }

    /// Identity used to detect two rules constraining one trie edge differently.
    pub(crate) fn signature(&self) -> String {
        match self {
            Self::Int => "int".into(),
            Self::Uuid => "uuid".into(),
            Self::Hex => "hex".into(),
            Self::Alpha => "alpha".into(),
            Self::Regex(re) => format!("/{}/", re.as_str()),
            Self::Predicate(f) => format!("fn@{:p}", Arc::as_ptr(f) as *const ()),
        }
    }
}

impl fmt::Debug for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

fn is_uuid(value: &str) -> bool {
    if value.len() != 36 {
        return false;
    }
    match uuid::Uuid::try_parse(value) {
        Ok(id) => (1..=5).contains(&id.get_version_num()) && id.get_variant() == uuid::Variant::RFC4122,
        Err(_) => false,
    }
}

//! Request path → metric label.
//!
//! Labels must come from a set that is known ahead of time, otherwise every
//! product id becomes its own time series. Known routes map onto fixed
//! buckets; anything else passes through unchanged unless folding is enabled.

use std::borrow::Cow;

/// Label used for unmatched paths when folding is enabled.
pub const OTHER_LABEL: &str = "/{other}";

/// Routes whose path is already a label.
const LITERAL_BUCKETS: &[&str] = &[
    "/",
    "/_healthz",
    "/robots.txt",
    "/cart",
    "/cart/empty",
    "/cart/checkout",
    "/setCurrency",
    "/logout",
    "/assistant",
    "/bot",
];

/// Prefix buckets, checked in order. `/product-meta` precedes `/product`,
/// which would otherwise swallow it.
const PREFIX_BUCKETS: &[(&str, &str)] = &[
    ("/product-meta", "/product-meta/{ids}"),
    ("/product", "/product/{id}"),
    ("/static", "/static/*"),
];

/// Map `path` to its bucket, or `None` if it matches no known route.
pub fn classify(base_path: &str, path: &str) -> Option<&'static str> {
    let path = strip_base(base_path, path);

    if let Some(literal) = LITERAL_BUCKETS.iter().copied().find(|literal| *literal == path) {
        return Some(literal);
    }
    PREFIX_BUCKETS
        .iter()
        .find(|(prefix, _)| path.starts_with(prefix))
        .map(|(_, label)| *label)
}

/// Normalize `path` into a metric label. Unmatched paths pass through
/// with the base path stripped.
pub fn normalize_path<'a>(base_path: &str, path: &'a str) -> Cow<'a, str> {
    match classify(base_path, path) {
        Some(label) => Cow::Borrowed(label),
        None => Cow::Borrowed(strip_base(base_path, path)),
    }
}

fn strip_base<'a>(base_path: &str, path: &'a str) -> &'a str {
    if base_path.is_empty() {
        return path;
    }
    match path.strip_prefix(base_path) {
        Some("") => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Configured normalizer used by the metrics stage.
#[derive(Debug, Clone, Default)]
pub struct PathNormalizer {
    base_path: String,
    fold_unmatched: bool,
}

impl PathNormalizer {
    pub fn new(base_path: impl Into<String>, fold_unmatched: bool) -> Self {
        Self {
            base_path: base_path.into(),
            fold_unmatched,
        }
    }

    pub fn label<'a>(&self, path: &'a str) -> Cow<'a, str> {
        if self.fold_unmatched {
            Cow::Borrowed(classify(&self.base_path, path).unwrap_or(OTHER_LABEL))
        } else {
            normalize_path(&self.base_path, path)
        }
    }
}

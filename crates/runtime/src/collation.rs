//! String collations used by grouping and sort keys.

use crate::consts::{CASE_BLIND_URI, CODEPOINT_URI};
use crate::error::{Error, ErrorCode};
use std::collections::HashMap;
use std::sync::Arc;

pub trait Collation: Send + Sync {
    fn uri(&self) -> &str;
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering;
    /// A key such that `key(a) == key(b)` iff the collation treats `a` and
    /// `b` as equal. Grouping maps use this instead of pairwise comparison.
    fn key(&self, s: &str) -> String {
        s.to_string()
    }
    fn equal(&self, a: &str, b: &str) -> bool {
        self.compare(a, b) == core::cmp::Ordering::Equal
    }
}

pub struct CodepointCollation;

impl Collation for CodepointCollation {
    fn uri(&self) -> &str {
        CODEPOINT_URI
    }
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering {
        a.cmp(b)
    }
}

/// Simple case-blind collation.
pub struct CaseBlindCollation;

impl Collation for CaseBlindCollation {
    fn uri(&self) -> &str {
        CASE_BLIND_URI
    }
    fn compare(&self, a: &str, b: &str) -> core::cmp::Ordering {
        self.key(a).cmp(&self.key(b))
    }
    fn key(&self, s: &str) -> String {
        s.to_lowercase()
    }
}

/// Registry of available collations, keyed by URI.
pub struct CollationRegistry {
    by_uri: HashMap<String, Arc<dyn Collation>>,
}

impl Default for CollationRegistry {
    fn default() -> Self {
        let mut reg = Self {
            by_uri: HashMap::new(),
        };
        reg.insert(Arc::new(CodepointCollation));
        reg.insert(Arc::new(CaseBlindCollation));
        reg
    }
}

impl CollationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collation: Arc<dyn Collation>) {
        self.by_uri.insert(collation.uri().to_string(), collation);
    }

    pub fn get(&self, uri: &str) -> Option<Arc<dyn Collation>> {
        self.by_uri.get(uri).cloned()
    }

    /// Resolve a collation URI; an unknown name is a hard error.
    pub fn resolve(&self, uri: Option<&str>) -> Result<Arc<dyn Collation>, Error> {
        match uri {
            Some(u) => self.get(u).ok_or_else(|| {
                Error::from_code(ErrorCode::XTDE1110, format!("unknown collation URI: {u}"))
            }),
            None => Ok(self
                .get(CODEPOINT_URI)
                .expect("codepoint collation registered")),
        }
    }
}

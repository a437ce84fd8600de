//! The read side of the data model: node kinds, expanded names and the
//! `XdmNode` trait that source and result trees implement.

use crate::error::{Error, ErrorCode};
use core::cmp::Ordering;
use string_cache::DefaultAtom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

/// An expanded QName. Equality and hashing ignore the prefix: two names are
/// the same name when namespace URI and local part match, the prefix is only
/// retained for serialization and diagnostics.
#[derive(Debug, Clone)]
pub struct QName {
    pub ns_uri: Option<DefaultAtom>,
    pub prefix: Option<DefaultAtom>,
    pub local: DefaultAtom,
}

impl QName {
    pub fn new(ns_uri: Option<&str>, prefix: Option<&str>, local: &str) -> Self {
        Self {
            ns_uri: ns_uri.map(DefaultAtom::from),
            prefix: prefix.map(DefaultAtom::from),
            local: DefaultAtom::from(local),
        }
    }

    /// A name in no namespace.
    pub fn local(local: &str) -> Self {
        Self::new(None, None, local)
    }

    pub fn ns_uri_str(&self) -> Option<&str> {
        self.ns_uri.as_deref()
    }

    /// Lexical form with prefix if present.
    pub fn display_name(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{}:{}", p, self.local),
            None => self.local.to_string(),
        }
    }

    /// EQName form: Q{ns}local, or the bare local name when unqualified.
    pub fn eqname(&self) -> String {
        match &self.ns_uri {
            Some(ns) => format!("Q{{{}}}{}", ns, self.local),
            None => self.local.to_string(),
        }
    }
}

impl PartialEq for QName {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.ns_uri == other.ns_uri
    }
}
impl Eq for QName {}
impl std::hash::Hash for QName {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ns_uri.hash(state);
        self.local.hash(state);
    }
}
impl core::fmt::Display for QName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// Checks `s` against the NCName production (simplified to the name
/// characters this engine accepts).
pub fn is_valid_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Parses a lexical QName (`local` or `prefix:local`) without resolving the
/// prefix. Returns `(prefix, local)`.
pub fn parse_lexical_qname(s: &str) -> Option<(Option<&str>, &str)> {
    match s.split_once(':') {
        Some((p, l)) if is_valid_ncname(p) && is_valid_ncname(l) => Some((Some(p), l)),
        None if is_valid_ncname(s) => Some((None, s)),
        _ => None,
    }
}

/// Read-only node interface implemented by source documents and by trees the
/// runtime constructs. Namespace declarations are exposed as prefix/URI
/// pairs rather than as nodes; the namespace axis is not part of this core.
pub trait XdmNode: Clone + Eq + core::fmt::Debug + Send + Sync + 'static {
    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<QName>;
    fn string_value(&self) -> String;

    /// Type annotation left by schema validation, if any.
    fn type_annotation(&self) -> Option<QName> {
        None
    }
    fn base_uri(&self) -> Option<String> {
        None
    }
    /// Source line, when the originating parser recorded one.
    fn line_number(&self) -> Option<u32> {
        None
    }

    fn parent(&self) -> Option<Self>;
    fn children(&self) -> Vec<Self>;
    fn attributes(&self) -> Vec<Self>;
    /// In-scope namespace declarations written on this element.
    fn namespace_declarations(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Document order. The default uses ancestry and sibling order and
    /// cannot order nodes from different trees; adapters with a global
    /// ordering key should override.
    fn compare_document_order(&self, other: &Self) -> Result<Ordering, Error> {
        try_compare_by_ancestry(self, other)
    }
}

/// Fallback document-order comparator: ancestors precede descendants, and
/// among siblings attributes precede children, each group in adapter order.
pub fn try_compare_by_ancestry<N: XdmNode>(a: &N, b: &N) -> Result<Ordering, Error> {
    if a == b {
        return Ok(Ordering::Equal);
    }
    fn path_to_root<N: XdmNode>(mut n: N) -> Vec<N> {
        let mut p = vec![n.clone()];
        while let Some(parent) = n.parent() {
            p.push(parent.clone());
            n = parent;
        }
        p.reverse();
        p
    }
    let pa = path_to_root(a.clone());
    let pb = path_to_root(b.clone());
    let len = core::cmp::min(pa.len(), pb.len());
    let mut i = 0usize;
    while i < len && pa[i] == pb[i] {
        i += 1;
    }
    if i == len {
        // One path is a prefix of the other: the shorter one is the ancestor
        return Ok(if pa.len() < pb.len() {
            Ordering::Less
        } else {
            Ordering::Greater
        });
    }
    if i == 0 {
        return Err(Error::from_code(
            ErrorCode::Unknown,
            "document order undefined for nodes from different trees",
        ));
    }
    let parent = &pa[i - 1];
    let mut sibs: Vec<N> = Vec::new();
    sibs.extend(parent.attributes());
    sibs.extend(parent.children());
    let posa = sibs.iter().position(|n| n == &pa[i]);
    let posb = sibs.iter().position(|n| n == &pb[i]);
    Ok(match (posa, posb) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    })
}

//! Items, atomic values and the pull-mode sequence protocol.

use crate::collation::Collation;
use crate::error::{Error, ErrorCode};
use crate::model::{QName, XdmNode};
use core::cmp::Ordering;
use core::fmt;

/// Atomic values the instruction core computes with. The full XDM atomic
/// hierarchy (dates, durations, binaries) lives in the out-of-scope XPath
/// layer; these are the types instruction evaluation itself produces.
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicValue {
    Boolean(bool),
    String(String),
    Integer(i64),
    Double(f64),
    UntypedAtomic(String),
    QName(QName),
}

impl AtomicValue {
    pub fn string_value(&self) -> String {
        match self {
            AtomicValue::Boolean(b) => b.to_string(),
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => s.clone(),
            AtomicValue::Integer(i) => i.to_string(),
            AtomicValue::Double(d) => {
                if d.fract() == 0.0 && d.is_finite() {
                    format!("{}", *d as i64)
                } else {
                    d.to_string()
                }
            }
            AtomicValue::QName(q) => q.display_name(),
        }
    }

    pub fn effective_boolean_value(&self) -> Result<bool, Error> {
        Ok(match self {
            AtomicValue::Boolean(b) => *b,
            AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => !s.is_empty(),
            AtomicValue::Integer(i) => *i != 0,
            AtomicValue::Double(d) => *d != 0.0 && !d.is_nan(),
            AtomicValue::QName(_) => {
                return Err(Error::from_code(
                    ErrorCode::XPTY0004,
                    "effective boolean value of a QName is undefined",
                ));
            }
        })
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AtomicValue::Integer(i) => Some(*i as f64),
            AtomicValue::Double(d) => Some(*d),
            AtomicValue::UntypedAtomic(s) | AtomicValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Ordering used by sort keys and grouping: numeric when both sides are
    /// numeric, otherwise by collation over the string values.
    pub fn compare(&self, other: &Self, collation: &dyn Collation) -> Ordering {
        match (self.as_numeric(), other.as_numeric()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => collation.compare(&self.string_value(), &other.string_value()),
        }
    }

    fn as_numeric(&self) -> Option<f64> {
        match self {
            AtomicValue::Integer(i) => Some(*i as f64),
            AtomicValue::Double(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for AtomicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_value())
    }
}

/// One member of a sequence: a node or an atomic value.
#[derive(Debug, Clone, PartialEq)]
pub enum Item<N> {
    Node(N),
    Atomic(AtomicValue),
}

impl<N: XdmNode> Item<N> {
    pub fn string_value(&self) -> String {
        match self {
            Item::Node(n) => n.string_value(),
            Item::Atomic(a) => a.string_value(),
        }
    }

    /// Atomization: nodes yield their typed value (untyped atomic of the
    /// string value in this core), atomics pass through.
    pub fn atomize(&self) -> AtomicValue {
        match self {
            Item::Node(n) => AtomicValue::UntypedAtomic(n.string_value()),
            Item::Atomic(a) => a.clone(),
        }
    }
}

impl<N> From<AtomicValue> for Item<N> {
    fn from(a: AtomicValue) -> Self {
        Item::Atomic(a)
    }
}

/// A fully materialized sequence.
pub type Sequence<N> = Vec<Item<N>>;

/// Effective boolean value of a sequence: empty is false, a leading node is
/// true, a singleton atomic decides by its own rules.
pub fn effective_boolean_value<N: XdmNode>(seq: &Sequence<N>) -> Result<bool, Error> {
    match seq.first() {
        None => Ok(false),
        Some(Item::Node(_)) => Ok(true),
        Some(Item::Atomic(a)) if seq.len() == 1 => a.effective_boolean_value(),
        Some(Item::Atomic(_)) => Err(Error::from_code(
            ErrorCode::XPTY0004,
            "effective boolean value of a multi-item atomic sequence",
        )),
    }
}

/// Pull protocol: a lazy, forward-only, single-pass stream of items.
pub trait SequenceIter<N: XdmNode> {
    fn next_item(&mut self) -> Result<Option<Item<N>>, Error>;

    /// Drain the remaining items into a vector.
    fn materialize(&mut self) -> Result<Sequence<N>, Error> {
        let mut out = Vec::new();
        while let Some(item) = self.next_item()? {
            out.push(item);
        }
        Ok(out)
    }
}

/// Boxed iterator tied to the lifetime of the expression tree it reads.
pub type BoxIter<'a, N> = Box<dyn SequenceIter<N> + 'a>;

pub struct EmptyIter;

impl<N: XdmNode> SequenceIter<N> for EmptyIter {
    fn next_item(&mut self) -> Result<Option<Item<N>>, Error> {
        Ok(None)
    }
}

pub struct OnceIter<N>(pub Option<Item<N>>);

impl<N: XdmNode> SequenceIter<N> for OnceIter<N> {
    fn next_item(&mut self) -> Result<Option<Item<N>>, Error> {
        Ok(self.0.take())
    }
}

pub struct VecIter<N> {
    items: std::vec::IntoIter<Item<N>>,
}

impl<N> VecIter<N> {
    pub fn new(items: Sequence<N>) -> Self {
        Self {
            items: items.into_iter(),
        }
    }
}

impl<N: XdmNode> SequenceIter<N> for VecIter<N> {
    fn next_item(&mut self) -> Result<Option<Item<N>>, Error> {
        Ok(self.items.next())
    }
}

/// Defers running the wrapped thunk until the first demand; the thunk
/// produces the underlying iterator. Used for lazy node construction.
pub struct DeferredIter<'a, N: XdmNode> {
    thunk: Option<Box<dyn FnOnce() -> Result<BoxIter<'a, N>, Error> + 'a>>,
    inner: Option<BoxIter<'a, N>>,
}

impl<'a, N: XdmNode> DeferredIter<'a, N> {
    pub fn new(thunk: impl FnOnce() -> Result<BoxIter<'a, N>, Error> + 'a) -> Self {
        Self {
            thunk: Some(Box::new(thunk)),
            inner: None,
        }
    }
}

impl<N: XdmNode> SequenceIter<N> for DeferredIter<'_, N> {
    fn next_item(&mut self) -> Result<Option<Item<N>>, Error> {
        if let Some(thunk) = self.thunk.take() {
            self.inner = Some(thunk()?);
        }
        match &mut self.inner {
            Some(inner) => inner.next_item(),
            None => Ok(None),
        }
    }
}

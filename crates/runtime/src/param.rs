//! Parameter sets passed between template caller and callee.

use smallvec::SmallVec;

use crate::model::XdmNode;
use crate::xdm::Sequence;

/// Integer identifier assigned to each distinct parameter name by the
/// compiler. Comparing ids avoids QName comparisons on the call path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamId(pub u32);

/// A name→value map keyed by [`ParamId`], built fresh by the caller for
/// each template call and read (never mutated) by the callee.
///
/// `put` either updates an existing entry or appends: ids stay unique
/// within one set, and the value written last wins together with its
/// type-checked flag.
pub struct ParameterSet<N: XdmNode> {
    ids: SmallVec<[ParamId; 4]>,
    values: SmallVec<[Sequence<N>; 4]>,
    // Parallel to `ids`: whether the value was already checked against the
    // parameter's declared type, so the callee can skip the re-check
    type_checked: SmallVec<[bool; 4]>,
}

impl<N: XdmNode> Default for ParameterSet<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XdmNode> ParameterSet<N> {
    pub fn new() -> Self {
        Self {
            ids: SmallVec::new(),
            values: SmallVec::new(),
            type_checked: SmallVec::new(),
        }
    }

    /// The canonical shared empty set.
    pub fn empty() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::new())
    }

    pub fn put(&mut self, id: ParamId, value: Sequence<N>, type_checked: bool) {
        if let Some(pos) = self.ids.iter().position(|&i| i == id) {
            self.values[pos] = value;
            self.type_checked[pos] = type_checked;
        } else {
            self.ids.push(id);
            self.values.push(value);
            self.type_checked.push(type_checked);
        }
    }

    pub fn get(&self, id: ParamId) -> Option<&Sequence<N>> {
        self.ids
            .iter()
            .position(|&i| i == id)
            .map(|pos| &self.values[pos])
    }

    pub fn is_type_checked(&self, id: ParamId) -> bool {
        self.ids
            .iter()
            .position(|&i| i == id)
            .is_some_and(|pos| self.type_checked[pos])
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Sequence<N>, bool)> {
        self.ids
            .iter()
            .zip(self.values.iter())
            .zip(self.type_checked.iter())
            .map(|((&id, v), &c)| (id, v, c))
    }
}

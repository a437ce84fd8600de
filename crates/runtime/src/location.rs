//! Interned source locations.
//!
//! Instruction nodes never hold a module URI string directly; they carry a
//! `LocationId` into a run-wide table so a compiled tree stays compact and
//! locations stay cheap to copy into errors.

use core::fmt;
use std::sync::{Arc, RwLock};

/// Index into a [`LocationMap`]. `LocationId::NONE` means "no location".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocationId(pub u32);

impl LocationId {
    pub const NONE: LocationId = LocationId(0);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// A resolved (module, line) pair, cheap to clone into errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub system_id: Arc<str>,
    pub line: u32,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.system_id, self.line)
    }
}

/// Allocation table mapping `LocationId`s to (module, line) pairs.
///
/// Entry 0 is reserved for `LocationId::NONE`. The table is append-only;
/// allocation happens while the compiler builds the tree, lookups happen on
/// the error path only.
#[derive(Debug, Default)]
pub struct LocationMap {
    entries: RwLock<Vec<SourceLocation>>,
}

impl LocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self, system_id: &str, line: u32) -> LocationId {
        let mut entries = self.entries.write().expect("location map poisoned");
        if entries.is_empty() {
            entries.push(SourceLocation {
                system_id: Arc::from("?"),
                line: 0,
            });
        }
        // Reuse the interned module string of the previous entry when possible
        let system_id: Arc<str> = entries
            .iter()
            .rev()
            .find(|e| &*e.system_id == system_id)
            .map_or_else(|| Arc::from(system_id), |e| Arc::clone(&e.system_id));
        entries.push(SourceLocation { system_id, line });
        LocationId(u32::try_from(entries.len() - 1).unwrap_or(0))
    }

    pub fn get(&self, id: LocationId) -> Option<SourceLocation> {
        if id.is_none() {
            return None;
        }
        self.entries
            .read()
            .expect("location map poisoned")
            .get(id.0 as usize)
            .cloned()
    }
}

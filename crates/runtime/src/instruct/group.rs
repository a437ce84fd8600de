//! Grouping (`for-each-group`) over a materialized population.
//!
//! Value-based algorithms (`group-by`, `group-adjacent`) identify a group
//! by a composite collation key over the whole atomized key sequence, so
//! every population item lands in exactly one group. Positional algorithms
//! (`group-starting-with` behavior via a boundary predicate, and its ending
//! counterpart) split on predicate matches and have no grouping key.
//! `group-by` groups appear in order of first appearance of their key.

use std::collections::HashMap;
use std::rc::Rc;

use crate::collation::Collation;
use crate::context::{Context, GroupFocus};
use crate::error::Error;
use crate::location::LocationId;
use crate::model::XdmNode;
use crate::xdm::{AtomicValue, Sequence};

use super::foreach::with_item_focus;
use super::{Expression, atomized_join};

#[derive(Debug, Clone, PartialEq)]
pub enum GroupingAlgorithm {
    /// One group per distinct key value, in order of first appearance.
    ByKey(Expression),
    /// A new group starts whenever the key changes between neighbours.
    AdjacentKey(Expression),
    /// An item matching the predicate starts a new group.
    StartingWhen(Expression),
    /// An item matching the predicate is the last of its group.
    EndingWhen(Expression),
}

/// A sort key applied to the groups (evaluated with the focus on each
/// group's initial item).
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub select: Expression,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForEachGroup {
    pub select: Expression,
    pub algorithm: GroupingAlgorithm,
    /// Collation URI for key comparison, possibly computed at run time.
    pub collation: Option<Expression>,
    pub sort_keys: Vec<SortKey>,
    pub body: Expression,
    pub loc: LocationId,
}

struct Group<N> {
    items: Sequence<N>,
    key: Option<AtomicValue>,
}

impl ForEachGroup {
    pub fn process<N: XdmNode>(&self, ctx: &mut Context<N>) -> Result<(), Error> {
        ctx.set_origin(self.loc);
        let population = self.select.evaluate_sequence(ctx)?;
        let collation = self.resolve_collation(ctx)?;
        let groups = match &self.algorithm {
            GroupingAlgorithm::ByKey(key) => {
                group_by(&population, key, collation.as_ref(), ctx)?
            }
            GroupingAlgorithm::AdjacentKey(key) => {
                group_adjacent(&population, key, collation.as_ref(), ctx)?
            }
            GroupingAlgorithm::StartingWhen(pred) => {
                group_boundaries(&population, pred, ctx, Boundary::Starts)?
            }
            GroupingAlgorithm::EndingWhen(pred) => {
                group_boundaries(&population, pred, ctx, Boundary::Ends)?
            }
        };
        let groups = self.sort_groups(groups, collation.as_ref(), ctx)?;

        let count = groups.len();
        let mut inner = ctx.new_minor();
        for (i, group) in groups.into_iter().enumerate() {
            let initial = group.items.first().expect("groups are never empty").clone();
            inner.set_focus(initial, i + 1, count);
            inner.set_current_group(Some(Rc::new(GroupFocus {
                items: group.items,
                key: group.key,
            })));
            self.body.process(&mut inner)?;
        }
        Ok(())
    }

    fn resolve_collation<N: XdmNode>(
        &self,
        ctx: &Context<N>,
    ) -> Result<std::sync::Arc<dyn Collation>, Error> {
        let uri = match &self.collation {
            Some(expr) => {
                let seq = expr.evaluate_sequence(ctx)?;
                Some(atomized_join(&seq, ""))
            }
            None => None,
        };
        ctx.controller()
            .collations()
            .resolve(uri.as_deref())
            .map_err(|e| e.with_location(ctx.origin_location()))
    }

    fn sort_groups<N: XdmNode>(
        &self,
        groups: Vec<Group<N>>,
        collation: &dyn Collation,
        ctx: &Context<N>,
    ) -> Result<Vec<Group<N>>, Error> {
        if self.sort_keys.is_empty() {
            return Ok(groups);
        }
        // Sort key values per group, computed with the focus on the
        // group's initial item
        let mut keyed: Vec<(Vec<Option<AtomicValue>>, usize)> = Vec::with_capacity(groups.len());
        let initials: Sequence<N> = groups
            .iter()
            .map(|g| g.items.first().expect("groups are never empty").clone())
            .collect();
        let values = with_item_focus(&initials, ctx, |c| {
            self.sort_keys
                .iter()
                .map(|k| super::singleton_atomic(&k.select, c))
                .collect::<Result<Vec<_>, _>>()
        })?;
        for (i, v) in values.into_iter().enumerate() {
            keyed.push((v, i));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, key) in self.sort_keys.iter().enumerate() {
                let ord = match (&a[i], &b[i]) {
                    (Some(x), Some(y)) => x.compare(y, collation),
                    (None, None) => core::cmp::Ordering::Equal,
                    // Empty sort key values order first
                    (None, Some(_)) => core::cmp::Ordering::Less,
                    (Some(_), None) => core::cmp::Ordering::Greater,
                };
                let ord = if key.descending { ord.reverse() } else { ord };
                if !ord.is_eq() {
                    return ord;
                }
            }
            core::cmp::Ordering::Equal
        });
        let mut slots: Vec<Option<Group<N>>> = groups.into_iter().map(Some).collect();
        Ok(keyed
            .into_iter()
            .map(|(_, i)| slots[i].take().expect("permutation is total"))
            .collect())
    }
}

/// Composite equality key over the full atomized key sequence: arity,
/// numeric canonicalization, and the collation's key function all
/// participate, so two key sequences map to the same group key exactly when
/// the collation treats them as equal.
fn composite_key(values: &[AtomicValue], collation: &dyn Collation) -> String {
    let mut out = String::new();
    for v in values {
        match v {
            AtomicValue::Integer(i) => {
                out.push_str("n:");
                out.push_str(&i.to_string());
            }
            AtomicValue::Double(d) => {
                // A whole-valued double shares its key with the equal integer;
                // integers format exactly so distinct i64 keys never collide
                out.push_str("n:");
                if d.is_finite()
                    && d.fract() == 0.0
                    && (i64::MIN as f64..=i64::MAX as f64).contains(d)
                {
                    out.push_str(&(*d as i64).to_string());
                } else {
                    out.push_str(&d.to_string());
                }
            }
            AtomicValue::Boolean(b) => {
                out.push_str("b:");
                out.push_str(&b.to_string());
            }
            other => {
                out.push_str("s:");
                out.push_str(&collation.key(&other.string_value()));
            }
        }
        out.push('\u{1}');
    }
    out
}

fn evaluate_keys<N: XdmNode>(
    population: &Sequence<N>,
    key: &Expression,
    ctx: &Context<N>,
) -> Result<Vec<Vec<AtomicValue>>, Error> {
    with_item_focus(population, ctx, |c| {
        Ok(key
            .evaluate_sequence(c)?
            .iter()
            .map(|item| item.atomize())
            .collect())
    })
}

fn group_by<N: XdmNode>(
    population: &Sequence<N>,
    key: &Expression,
    collation: &dyn Collation,
    ctx: &Context<N>,
) -> Result<Vec<Group<N>>, Error> {
    let keys = evaluate_keys(population, key, ctx)?;
    let mut groups: Vec<Group<N>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (item, key_values) in population.iter().zip(keys) {
        let composite = composite_key(&key_values, collation);
        match index.get(&composite) {
            Some(&i) => groups[i].items.push(item.clone()),
            None => {
                index.insert(composite, groups.len());
                groups.push(Group {
                    items: vec![item.clone()],
                    key: key_values.first().cloned(),
                });
            }
        }
    }
    Ok(groups)
}

fn group_adjacent<N: XdmNode>(
    population: &Sequence<N>,
    key: &Expression,
    collation: &dyn Collation,
    ctx: &Context<N>,
) -> Result<Vec<Group<N>>, Error> {
    let keys = evaluate_keys(population, key, ctx)?;
    let mut groups: Vec<Group<N>> = Vec::new();
    let mut previous: Option<String> = None;
    for (item, key_values) in population.iter().zip(keys) {
        let composite = composite_key(&key_values, collation);
        if previous.as_deref() == Some(composite.as_str()) {
            groups
                .last_mut()
                .expect("adjacent group open")
                .items
                .push(item.clone());
        } else {
            groups.push(Group {
                items: vec![item.clone()],
                key: key_values.first().cloned(),
            });
            previous = Some(composite);
        }
    }
    Ok(groups)
}

#[derive(Clone, Copy, PartialEq)]
enum Boundary {
    Starts,
    Ends,
}

fn group_boundaries<N: XdmNode>(
    population: &Sequence<N>,
    predicate: &Expression,
    ctx: &Context<N>,
    boundary: Boundary,
) -> Result<Vec<Group<N>>, Error> {
    let matches = with_item_focus(population, ctx, |c| predicate.effective_boolean(c))?;
    let mut groups: Vec<Group<N>> = Vec::new();
    let mut open = false;
    for (item, is_boundary) in population.iter().zip(matches) {
        let start_new = match boundary {
            // The first item always opens a group
            Boundary::Starts => !open || is_boundary,
            Boundary::Ends => !open,
        };
        if start_new {
            groups.push(Group {
                items: Vec::new(),
                key: None,
            });
            open = true;
        }
        groups
            .last_mut()
            .expect("boundary group open")
            .items
            .push(item.clone());
        if boundary == Boundary::Ends && is_boundary {
            open = false;
        }
    }
    Ok(groups)
}

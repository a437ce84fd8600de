//! Run-scoped store and lazy-evaluation manager for global variables.
//!
//! Each slot moves through `Unevaluated → Evaluating → Done`. Re-entering
//! `Evaluating` on the same thread is a circular definition. A second
//! thread arriving while the first is evaluating waits briefly on the
//! slot's condvar; if the first evaluation has not finished by then it
//! evaluates redundantly and the first completed value wins. The redundant
//! evaluation is a deliberate choice carried over from the reference
//! behavior: initializers are pure expressions here, so evaluating one
//! twice is safe, and it keeps slow evaluators from serializing unrelated
//! worker threads.

use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use crate::error::{Error, ErrorCode};
use crate::model::{QName, XdmNode};
use crate::xdm::Sequence;

enum SlotState<N> {
    Unevaluated,
    Evaluating(ThreadId),
    Done(Sequence<N>),
}

struct GlobalSlot<N> {
    state: Mutex<SlotState<N>>,
    cond: Condvar,
}

pub struct Bindery<N: XdmNode> {
    slots: Vec<GlobalSlot<N>>,
}

const WAIT_FOR_PEER: Duration = Duration::from_millis(50);

impl<N: XdmNode> Bindery<N> {
    pub fn new(slot_count: usize) -> Self {
        let mut slots = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            slots.push(GlobalSlot {
                state: Mutex::new(SlotState::Unevaluated),
                cond: Condvar::new(),
            });
        }
        Self { slots }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Discard all computed values. Used when global parameters are
    /// redefined for a rerun of the same compiled package.
    pub fn reset(&self) {
        for slot in &self.slots {
            *slot.state.lock().expect("bindery lock") = SlotState::Unevaluated;
            slot.cond.notify_all();
        }
    }

    /// Read the value of a global variable, computing it with `evaluate` on
    /// first access. Once computed the value is immutable and shared.
    pub fn global_value(
        &self,
        slot: usize,
        name: &QName,
        evaluate: impl FnOnce() -> Result<Sequence<N>, Error>,
    ) -> Result<Sequence<N>, Error> {
        let this_thread = std::thread::current().id();
        let cell = self.slots.get(slot).ok_or_else(|| {
            Error::from_code(
                ErrorCode::Unknown,
                format!("global variable slot {slot} out of range"),
            )
        })?;

        {
            let mut state = cell.state.lock().expect("bindery lock");
            loop {
                match &*state {
                    SlotState::Done(value) => return Ok(value.clone()),
                    SlotState::Evaluating(tid) if *tid == this_thread => {
                        return Err(Error::from_code(
                            ErrorCode::XTDE0640,
                            format!("circular definition of global variable ${name}"),
                        ));
                    }
                    SlotState::Evaluating(_) => {
                        // Another thread is on it; wait briefly, then fall
                        // back to evaluating redundantly
                        let (next, timeout) = cell
                            .cond
                            .wait_timeout(state, WAIT_FOR_PEER)
                            .expect("bindery lock");
                        state = next;
                        if timeout.timed_out() {
                            if let SlotState::Done(value) = &*state {
                                return Ok(value.clone());
                            }
                            break;
                        }
                    }
                    SlotState::Unevaluated => {
                        *state = SlotState::Evaluating(this_thread);
                        break;
                    }
                }
            }
        }

        tracing::debug!(variable = %name, slot, "evaluating global variable");
        let result = evaluate();

        let mut state = cell.state.lock().expect("bindery lock");
        match result {
            Ok(value) => {
                if let SlotState::Done(existing) = &*state {
                    // A concurrent evaluation finished first; its value wins
                    let existing = existing.clone();
                    drop(state);
                    return Ok(existing);
                }
                *state = SlotState::Done(value.clone());
                cell.cond.notify_all();
                Ok(value)
            }
            Err(e) => {
                if matches!(&*state, SlotState::Evaluating(tid) if *tid == this_thread) {
                    *state = SlotState::Unevaluated;
                }
                cell.cond.notify_all();
                Err(e)
            }
        }
    }
}

/// Static dependency graph between global variables, checked before
/// execution so transitive cycles surface eagerly rather than mid-run.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: Vec<(usize, usize)>, // (variable, variable it reads)
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, from: usize, to: usize) {
        if !self.edges.contains(&(from, to)) {
            self.edges.push((from, to));
        }
    }

    /// Depth-first cycle check over the registered edges.
    pub fn check_for_cycles(&self, names: &[QName]) -> Result<(), Error> {
        let n = names.len();
        // 0 = unvisited, 1 = on stack, 2 = finished
        let mut mark = vec![0u8; n];

        fn visit(
            node: usize,
            edges: &[(usize, usize)],
            mark: &mut [u8],
            names: &[QName],
        ) -> Result<(), Error> {
            if node >= mark.len() {
                return Ok(());
            }
            if mark[node] == 1 {
                return Err(Error::from_code(
                    ErrorCode::XTDE0640,
                    format!(
                        "circular dependency among global variables involving ${}",
                        names[node]
                    ),
                ));
            }
            if mark[node] == 2 {
                return Ok(());
            }
            mark[node] = 1;
            for &(from, to) in edges {
                if from == node {
                    visit(to, edges, mark, names)?;
                }
            }
            mark[node] = 2;
            Ok(())
        }

        for v in 0..n {
            visit(v, &self.edges, &mut mark, names)?;
        }
        Ok(())
    }
}

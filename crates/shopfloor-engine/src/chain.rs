//! In-memory view of operation chains.
//!
//! Operations live in an arena keyed by id; links stay ids and are resolved
//! through the arena, so a corrupt link is a lookup miss rather than a
//! dangling reference. Every traversal goes through [`ChainWalk`], which
//! carries the visited set that keeps walks finite on cyclic data.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use shopfloor_core::ids::OperationId;
use shopfloor_core::Operation;

/// Non-fatal chain corruption met during a walk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntegrityWarning {
    /// The walk came back to an operation it had already visited.
    Cycle { at: OperationId },
    /// A `next` link names an operation that is not in the chain.
    DanglingLink { from: OperationId, to: OperationId },
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle { at } => write!(f, "chain cycle at {at}"),
            Self::DanglingLink { from, to } => write!(f, "{from} links to missing {to}"),
        }
    }
}

/// Operations indexed by id, with the predecessor relation derived from
/// the input alone.
#[derive(Clone, Debug, Default)]
pub struct ChainArena {
    ops: HashMap<OperationId, Operation>,
    previous: HashMap<OperationId, OperationId>,
    children: HashMap<OperationId, Vec<OperationId>>,
}

impl ChainArena {
    pub fn new(operations: impl IntoIterator<Item = Operation>) -> Self {
        let ops: HashMap<OperationId, Operation> = operations
            .into_iter()
            .map(|op| (op.id.clone(), op))
            .collect();

        // A stated predecessor wins; otherwise fall back to whoever names
        // the operation as its next. Links leaving the input are ignored.
        let mut previous = HashMap::new();
        for op in ops.values() {
            if let Some(prev) = &op.previous_operation {
                if ops.contains_key(prev) && prev != &op.id {
                    previous.insert(op.id.clone(), prev.clone());
                }
            }
        }
        let mut by_next: Vec<&Operation> = ops.values().collect();
        by_next.sort_by(|a, b| a.id.cmp(&b.id));
        for op in by_next {
            if let Some(next) = &op.next_operation {
                if ops.contains_key(next) && next != &op.id && !previous.contains_key(next) {
                    previous.insert(next.clone(), op.id.clone());
                }
            }
        }

        let mut children: HashMap<OperationId, Vec<OperationId>> = HashMap::new();
        for (child, parent) in &previous {
            children.entry(parent.clone()).or_default().push(child.clone());
        }
        for list in children.values_mut() {
            list.sort_by(|a, b| sort_key(&ops[a]).cmp(&sort_key(&ops[b])));
        }

        Self {
            ops,
            previous,
            children,
        }
    }

    pub fn get(&self, id: &OperationId) -> Option<&Operation> {
        self.ops.get(id)
    }

    pub fn get_mut(&mut self, id: &OperationId) -> Option<&mut Operation> {
        self.ops.get_mut(id)
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.ops.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Predecessor within this arena, if any.
    pub fn previous_of(&self, id: &OperationId) -> Option<&OperationId> {
        self.previous.get(id)
    }

    /// Operations that name `id` as their predecessor, in sequencing order.
    pub fn children_of(&self, id: &OperationId) -> &[OperationId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Operations without a predecessor in this arena, in sequencing order.
    pub fn roots(&self) -> Vec<OperationId> {
        let mut roots: Vec<&Operation> = self
            .ops
            .values()
            .filter(|op| !self.previous.contains_key(&op.id))
            .collect();
        roots.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        roots.into_iter().map(|op| op.id.clone()).collect()
    }

    /// All ids in sequencing order, ignoring links.
    pub fn ids_by_plan(&self) -> Vec<OperationId> {
        let mut all: Vec<&Operation> = self.ops.values().collect();
        all.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        all.into_iter().map(|op| op.id.clone()).collect()
    }

    /// Take operations out of the arena in the given order. Ids that are not
    /// present (or repeated) are skipped.
    pub fn take_ordered(mut self, ids: &[OperationId]) -> Vec<Operation> {
        ids.iter().filter_map(|id| self.ops.remove(id)).collect()
    }

    pub fn into_operations(self) -> impl Iterator<Item = Operation> {
        self.ops.into_values()
    }
}

/// Ordering used wherever the chain does not decide: planned start, missing
/// plans first, then id.
pub(crate) fn sort_key(op: &Operation) -> (Option<chrono::DateTime<chrono::Utc>>, &OperationId) {
    (op.planned_start, &op.id)
}

/// A bounded traversal over a [`ChainArena`]. The visited set is shared by
/// every walk started from the same `ChainWalk`.
#[derive(Debug, Default)]
pub struct ChainWalk {
    visited: HashSet<OperationId>,
    warnings: Vec<IntegrityWarning>,
}

impl ChainWalk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` visited. Returns false if it already was.
    pub fn enter(&mut self, id: &OperationId) -> bool {
        self.visited.insert(id.clone())
    }

    pub fn is_visited(&self, id: &OperationId) -> bool {
        self.visited.contains(id)
    }

    /// Successors of `anchor` by `next` link, in chain order. Stops at the
    /// tail, at a link that leaves the arena, or at an operation already
    /// visited.
    pub fn forward(&mut self, arena: &ChainArena, anchor: &OperationId) -> Vec<OperationId> {
        self.enter(anchor);
        let mut chain = Vec::new();
        let mut current = anchor.clone();
        loop {
            let Some(next) = arena.get(&current).and_then(|op| op.next_operation.clone()) else {
                break;
            };
            if !arena.contains(&next) {
                self.warn(IntegrityWarning::DanglingLink {
                    from: current,
                    to: next,
                });
                break;
            }
            if !self.enter(&next) {
                self.warn(IntegrityWarning::Cycle { at: next });
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// Pre-order depth-first walk from `root` through the predecessor
    /// relation. Operations already visited are not emitted again.
    pub fn depth_first(&mut self, arena: &ChainArena, root: &OperationId) -> Vec<OperationId> {
        let mut emitted = Vec::new();
        if !self.enter(root) {
            return emitted;
        }
        emitted.push(root.clone());
        let mut pending: Vec<Vec<OperationId>> = vec![arena.children_of(root).to_vec()];

        while let Some(children) = pending.last_mut() {
            if children.is_empty() {
                pending.pop();
                continue;
            }
            let child = children.remove(0);
            if !self.enter(&child) {
                self.warn(IntegrityWarning::Cycle { at: child });
                continue;
            }
            pending.push(arena.children_of(&child).to_vec());
            emitted.push(child);
        }
        emitted
    }

    pub fn warnings(&self) -> &[IntegrityWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<IntegrityWarning> {
        self.warnings
    }

    fn warn(&mut self, warning: IntegrityWarning) {
        warn!(%warning, "chain integrity");
        self.warnings.push(warning);
    }
}

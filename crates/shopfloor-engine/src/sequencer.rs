use tracing::debug;

use shopfloor_core::Operation;

use crate::chain::{ChainArena, ChainWalk, IntegrityWarning};

/// Result of ordering a set of operations.
#[derive(Clone, Debug, Default)]
pub struct Sequenced {
    pub operations: Vec<Operation>,
    pub warnings: Vec<IntegrityWarning>,
}

/// Order operations for display: chains walked from their roots, roots and
/// siblings by planned start (missing first), ties by id. Pure; the output
/// is always a permutation of the input.
pub fn sequence(operations: Vec<Operation>) -> Vec<Operation> {
    sequence_with_warnings(operations).operations
}

pub fn sequence_with_warnings(operations: Vec<Operation>) -> Sequenced {
    if operations.is_empty() {
        return Sequenced::default();
    }
    let arena = ChainArena::new(operations);
    let mut walk = ChainWalk::new();
    let mut order = Vec::with_capacity(arena.len());

    for root in arena.roots() {
        order.extend(walk.depth_first(&arena, &root));
    }

    // Whatever is left sits on a cycle with no way in from a root.
    let stranded: Vec<_> = arena
        .ids_by_plan()
        .into_iter()
        .filter(|id| !walk.is_visited(id))
        .collect();
    if !stranded.is_empty() {
        debug!(count = stranded.len(), "sequencing operations stranded on cycles");
        for id in stranded {
            order.extend(walk.depth_first(&arena, &id));
        }
    }

    Sequenced {
        operations: arena.take_ordered(&order),
        warnings: walk.into_warnings(),
    }
}

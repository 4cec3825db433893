//! Cart Actions
//!
//! Every change to the in-memory cart goes through [`CartAction::apply`].
//! Actions carry already-validated, already-stamped lines, so applying one
//! cannot fail part way through.

use tracing::debug;

use crate::cart::{
    lines::{CartLine, CartLinePatch, LineId},
    merge::{fold_into, find_equivalent, merge_quantity},
};

/// A cart transition.
#[derive(Debug, Clone, PartialEq)]
pub enum CartAction {
    /// Replace the whole collection with persisted state.
    Hydrate(Vec<CartLine>),

    /// Insert a line, or merge it into its equivalent.
    Add(CartLine),

    /// Insert several lines.
    AddMany {
        /// Lines in insertion order.
        lines: Vec<CartLine>,

        /// Fold the batch as a whole (true) or add line by line (false).
        merge: bool,
    },

    /// Patch the line with the given id.
    Update {
        /// Line to patch.
        id: LineId,

        /// Fields to replace.
        patch: CartLinePatch,
    },

    /// Delete the line with the given id.
    Remove(LineId),

    /// Empty the cart.
    Clear,
}

/// What applying an action did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Whether the collection changed.
    pub changed: bool,

    /// Ids of the lines the added input landed in, in input order.
    pub landed: Vec<LineId>,
}

impl Applied {
    fn unchanged() -> Self {
        Self {
            changed: false,
            landed: Vec::new(),
        }
    }

    fn changed() -> Self {
        Self {
            changed: true,
            landed: Vec::new(),
        }
    }
}

impl CartAction {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hydrate(_) => "hydrate",
            Self::Add(_) => "add",
            Self::AddMany { .. } => "add_many",
            Self::Update { .. } => "update",
            Self::Remove(_) => "remove",
            Self::Clear => "clear",
        }
    }

    /// Apply this action to `lines`.
    pub fn apply(self, lines: &mut Vec<CartLine>) -> Applied {
        match self {
            Self::Hydrate(next) => {
                *lines = next;

                Applied::changed()
            }
            Self::Add(line) => {
                let positions = fold_into(lines, [line]);

                landed(lines, positions)
            }
            Self::AddMany { lines: batch, merge } => {
                let positions = if merge {
                    fold_into(lines, batch)
                } else {
                    batch
                        .into_iter()
                        .flat_map(|line| fold_into(lines, [line]))
                        .collect()
                };

                landed(lines, positions)
            }
            Self::Update { id, patch } => update(lines, id, patch),
            Self::Remove(id) => {
                let before = lines.len();

                lines.retain(|line| line.id != id);

                if lines.len() == before {
                    debug!(%id, "remove ignored: no such line");
                    Applied::unchanged()
                } else {
                    Applied::changed()
                }
            }
            Self::Clear => {
                if lines.is_empty() {
                    Applied::unchanged()
                } else {
                    lines.clear();

                    Applied::changed()
                }
            }
        }
    }
}

fn landed(lines: &[CartLine], positions: Vec<usize>) -> Applied {
    Applied {
        changed: !positions.is_empty(),
        landed: positions
            .into_iter()
            .filter_map(|position| lines.get(position).map(|line| line.id))
            .collect(),
    }
}

fn update(lines: &mut Vec<CartLine>, id: LineId, patch: CartLinePatch) -> Applied {
    let Some(position) = lines.iter().position(|line| line.id == id) else {
        debug!(%id, "update ignored: no such line");
        return Applied::unchanged();
    };

    let Some(line) = lines.get_mut(position) else {
        return Applied::unchanged();
    };

    patch.apply_to(line);

    let edited = line.clone();

    // An edit may make this line equivalent to another one; keep the other.
    if let Some(other) = find_equivalent(lines, &edited, position) {
        if let Some(target) = lines.get_mut(other) {
            target.quantity = merge_quantity(target, &edited);
        }

        lines.remove(position);

        debug!(%id, "edited line folded into its equivalent");
    }

    Applied::changed()
}

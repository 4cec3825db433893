//! Line merging
//!
//! Two cart lines are "the same line" when their equivalence keys match.
//! Adding an equivalent line accumulates quantity into the line already in
//! the cart; every other field of the first insertion is kept.

use std::fmt::{Display, Formatter, Result as FmtResult};

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::cart::lines::{CartLine, present};

const SEPARATOR: &str = "\u{1f}";

/// Derived identity of a cart line for merge purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EquivalenceKey(String);

impl EquivalenceKey {
    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EquivalenceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0.replace(SEPARATOR, "::"))
    }
}

/// Compute the equivalence key of `line`.
///
/// Built from the category, the item identity (`item_key`, falling back to
/// `item_label`), the sub-item and the unit. Absent parts contribute an
/// empty segment. Note and creation time never take part.
pub fn equivalence_key(line: &CartLine) -> EquivalenceKey {
    let parts = [
        line.category.trim(),
        line.item_identity().unwrap_or_default(),
        present(line.sub_item.as_deref()).unwrap_or_default(),
        line.unit.trim(),
    ];

    EquivalenceKey(parts.join(SEPARATOR))
}

/// Quantity after merging `incoming` into `existing`.
pub fn merge_quantity(existing: &CartLine, incoming: &CartLine) -> Decimal {
    existing.quantity.saturating_add(incoming.quantity)
}

/// Fold `incoming` into `lines`, merging by equivalence key.
///
/// Lines that match an existing entry (or an earlier entry of the same
/// batch) accumulate quantity in place; the rest are appended in order.
/// Returns the final position of each incoming line.
pub(crate) fn fold_into(
    lines: &mut Vec<CartLine>,
    incoming: impl IntoIterator<Item = CartLine>,
) -> Vec<usize> {
    let mut index: FxHashMap<EquivalenceKey, usize> = lines
        .iter()
        .enumerate()
        .map(|(position, line)| (equivalence_key(line), position))
        .collect();

    incoming
        .into_iter()
        .map(|line| {
            let key = equivalence_key(&line);

            if let Some(&position) = index.get(&key) {
                if let Some(existing) = lines.get_mut(position) {
                    existing.quantity = merge_quantity(existing, &line);
                }

                position
            } else {
                let position = lines.len();

                index.insert(key, position);
                lines.push(line);

                position
            }
        })
        .collect()
}

/// Position of the line equivalent to `line`, ignoring the line at `skip`.
pub(crate) fn find_equivalent(lines: &[CartLine], line: &CartLine, skip: usize) -> Option<usize> {
    let key = equivalence_key(line);

    lines
        .iter()
        .enumerate()
        .find(|(position, other)| *position != skip && equivalence_key(other) == key)
        .map(|(position, _)| position)
}

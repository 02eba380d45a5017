//! Quantity-location multiset arithmetic
//!
//! Associative, commutative arithmetic over collections of
//! `ProductQuantityLocation`, keyed by (product, location) with per-batch
//! sums inside each entry. Zero-quantity entries are valid inputs; a key
//! present in only one operand behaves as if the other contributed zero.
//!
//! Two families of operations exist: the batch-aware ones used when batch
//! tracking is active, and legacy variants that ignore batch breakdowns
//! entirely.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::models::{BatchQuantityMap, ProductQuantityLocation, StockLocationReference};

type Key = (Uuid, StockLocationReference);

#[derive(Default)]
struct Accumulator {
    quantity: i64,
    batches: BTreeMap<Uuid, i64>,
    batch_aware: bool,
}

fn merge<'a>(entries: impl Iterator<Item = &'a ProductQuantityLocation>) -> BTreeMap<Key, Accumulator> {
    let mut merged: BTreeMap<Key, Accumulator> = BTreeMap::new();
    for entry in entries {
        let slot = merged
            .entry((entry.product_id, entry.location))
            .or_default();
        slot.quantity += entry.quantity;
        if let Some(batches) = &entry.batches {
            slot.batch_aware = true;
            for (batch_id, quantity) in batches.iter() {
                *slot.batches.entry(batch_id).or_default() += quantity;
            }
        }
    }
    merged
}

fn collect(merged: BTreeMap<Key, Accumulator>) -> Vec<ProductQuantityLocation> {
    merged
        .into_iter()
        .map(|((product_id, location), acc)| ProductQuantityLocation {
            product_id,
            location,
            quantity: acc.quantity,
            batches: acc.batch_aware.then(|| BatchQuantityMap::new(acc.batches)),
        })
        .collect()
}

/// Merge both operands by (product, location), summing total quantities and
/// per-batch quantities. Returns one entry per distinct key.
pub fn add(
    a: &[ProductQuantityLocation],
    b: &[ProductQuantityLocation],
) -> Vec<ProductQuantityLocation> {
    collect(merge(a.iter().chain(b.iter())))
}

/// Every quantity, total and batch-level, sign-flipped.
pub fn negate(entries: &[ProductQuantityLocation]) -> Vec<ProductQuantityLocation> {
    entries
        .iter()
        .map(|entry| ProductQuantityLocation {
            product_id: entry.product_id,
            location: entry.location,
            quantity: -entry.quantity,
            batches: entry.batches.as_ref().map(BatchQuantityMap::negated),
        })
        .collect()
}

/// Remove the subtrahend's quantities from the minuend, batch-aware.
///
/// Keys whose resulting total is not positive are discarded entirely: stock
/// that is fully reserved must not appear as available. Batches are treated
/// independently of the entry total: a batch whose result is not positive is
/// dropped even when the entry total stays positive through the no-batch
/// remainder. The result only ever contains keys and batches that exist in
/// the minuend; negative subtrahend quantities must not materialize stock
/// that was never there.
pub fn remove_matching(
    minuend: &[ProductQuantityLocation],
    subtrahend: &[ProductQuantityLocation],
) -> Vec<ProductQuantityLocation> {
    let present = minuend_keys(minuend);
    add(minuend, &negate(subtrahend))
        .into_iter()
        .filter(|entry| entry.quantity > 0)
        .filter_map(|mut entry| {
            let batches_present = present.get(&(entry.product_id, entry.location))?;
            if let Some(batches) = entry.batches.take() {
                let clipped: BatchQuantityMap = batches
                    .iter()
                    .filter(|(batch_id, quantity)| {
                        *quantity > 0 && batches_present.contains(batch_id)
                    })
                    .collect();
                entry.batches = (!clipped.is_empty()).then_some(clipped);
            }
            Some(entry)
        })
        .collect()
}

fn minuend_keys(minuend: &[ProductQuantityLocation]) -> BTreeMap<Key, BTreeSet<Uuid>> {
    let mut keys: BTreeMap<Key, BTreeSet<Uuid>> = BTreeMap::new();
    for entry in minuend {
        let batch_ids = keys.entry((entry.product_id, entry.location)).or_default();
        if let Some(batches) = &entry.batches {
            batch_ids.extend(batches.batch_ids());
        }
    }
    keys
}

/// Legacy merge that discards batch breakdowns entirely.
pub fn add_ignoring_batches(
    a: &[ProductQuantityLocation],
    b: &[ProductQuantityLocation],
) -> Vec<ProductQuantityLocation> {
    let mut merged: BTreeMap<Key, i64> = BTreeMap::new();
    for entry in a.iter().chain(b.iter()) {
        *merged.entry((entry.product_id, entry.location)).or_default() += entry.quantity;
    }
    merged
        .into_iter()
        .map(|((product_id, location), quantity)| {
            ProductQuantityLocation::new(product_id, location, quantity)
        })
        .collect()
}

/// Legacy subtraction: add the negated subtrahend, ignoring batches, and
/// filter out keys whose result is not positive or that the minuend never
/// contained.
pub fn remove_matching_ignoring_batches(
    minuend: &[ProductQuantityLocation],
    subtrahend: &[ProductQuantityLocation],
) -> Vec<ProductQuantityLocation> {
    let present: BTreeSet<Key> = minuend
        .iter()
        .map(|entry| (entry.product_id, entry.location))
        .collect();
    add_ignoring_batches(minuend, &negate(subtrahend))
        .into_iter()
        .filter(|entry| {
            entry.quantity > 0 && present.contains(&(entry.product_id, entry.location))
        })
        .collect()
}

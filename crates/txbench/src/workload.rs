//! Workload generation.
//!
//! Batches are a pure function of their inputs so repeated runs, and backends
//! with upsert semantics, end in the same state.

use crate::config::KeyPrefixPolicy;

/// Added to the item index to form its value.
pub const VALUE_OFFSET: usize = 42;

/// Marker between the iteration prefix and the item index in a key.
const KEY_STEM: &str = "answer";

/// One key/value pair to write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkloadItem {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl WorkloadItem {
    /// Build the item at `item_index` of iteration `iteration_index`.
    pub fn new(iteration_index: usize, item_index: usize, policy: KeyPrefixPolicy) -> Self {
        let key = match policy {
            KeyPrefixPolicy::PerIteration => {
                format!("{}{}{}", iteration_index, KEY_STEM, item_index)
            }
            KeyPrefixPolicy::Shared => format!("{}{}", KEY_STEM, item_index),
        };
        let value = (item_index + VALUE_OFFSET).to_string();

        Self {
            key: key.into_bytes(),
            value: value.into_bytes(),
        }
    }
}

/// Generate the `batch_size` items of one iteration, in index order.
pub fn generate(
    iteration_index: usize,
    batch_size: usize,
    policy: KeyPrefixPolicy,
) -> Vec<WorkloadItem> {
    (0..batch_size)
        .map(|item_index| WorkloadItem::new(iteration_index, item_index, policy))
        .collect()
}

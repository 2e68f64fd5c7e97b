use std::collections::BTreeMap;

use crate::config::MergePolicy;
use crate::models::RawWeightEntry;

/// Running merge of a user's entries, one per calendar date.
///
/// Keyed by the `YYYY-MM-DD` string, so iteration is chronological.
#[derive(Debug, Clone, Default)]
pub struct MergeAccumulator {
    entries: BTreeMap<String, RawWeightEntry>,
    policy: MergePolicy,
}

impl MergeAccumulator {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            entries: BTreeMap::new(),
            policy,
        }
    }

    /// Fold a batch in arrival order. Returns how many dates were added or replaced.
    pub fn fold<I>(&mut self, batch: I) -> usize
    where
        I: IntoIterator<Item = RawWeightEntry>,
    {
        let mut changed = 0;
        for entry in batch {
            if self.insert(entry) {
                changed += 1;
            }
        }
        changed
    }

    fn insert(&mut self, entry: RawWeightEntry) -> bool {
        match self.entries.get(&entry.calendar_date) {
            Some(existing)
                if self.policy == MergePolicy::NewestMeasurement
                    && entry.epoch_millis <= existing.epoch_millis =>
            {
                false
            }
            Some(existing) if *existing == entry => false,
            _ => {
                self.entries.insert(entry.calendar_date.clone(), entry);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current merged set in ascending date order.
    pub fn entries(&self) -> Vec<RawWeightEntry> {
        self.entries.values().cloned().collect()
    }
}

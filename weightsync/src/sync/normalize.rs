use chrono::DateTime;

use crate::models::{RawWeightEntry, WeightRecord};

pub fn normalize(entry: &RawWeightEntry) -> WeightRecord {
    WeightRecord {
        date: DateTime::from_timestamp_millis(entry.epoch_millis).unwrap_or_default(),
        mass_grams: entry.weight_grams,
    }
}

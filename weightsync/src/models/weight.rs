use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BodyComposition {
    pub bmi: Option<f64>,
    pub body_water_pct: Option<f64>,
    pub body_fat_pct: Option<f64>,
    pub bone_mass_grams: Option<i64>,
    pub muscle_mass_grams: Option<i64>,
}

impl BodyComposition {
    pub fn is_empty(&self) -> bool {
        self.bmi.is_none()
            && self.body_water_pct.is_none()
            && self.body_fat_pct.is_none()
            && self.bone_mass_grams.is_none()
            && self.muscle_mass_grams.is_none()
    }
}

/// One measurement as reported by the remote service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawWeightEntry {
    /// `YYYY-MM-DD`
    pub calendar_date: String,
    pub weight_grams: i64,
    pub epoch_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_composition: Option<BodyComposition>,
}

impl RawWeightEntry {
    pub fn new(calendar_date: impl Into<String>, weight_grams: i64, epoch_millis: i64) -> Self {
        Self {
            calendar_date: calendar_date.into(),
            weight_grams,
            epoch_millis,
            source_type: None,
            body_composition: None,
        }
    }
}

/// The consumer-facing view of a measurement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WeightRecord {
    pub date: DateTime<Utc>,
    pub mass_grams: i64,
}

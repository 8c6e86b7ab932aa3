use serde::{Deserialize, Serialize};

use crate::errors::{GeoError, Result};

/// Closed value interval mapped to an output class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub min: f64,
    pub max: f64,
    pub class: i32,
}

impl ClassificationRule {
    pub fn new(min: f64, max: f64, class: i32) -> Self {
        Self { min, max, class }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Ordered rules. Where intervals overlap the rule listed last wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationRules(Vec<ClassificationRule>);

impl ClassificationRules {
    pub fn new(rules: Vec<ClassificationRule>) -> Self {
        Self(rules)
    }

    pub fn rules(&self) -> &[ClassificationRule] {
        &self.0
    }

    /// Rejects empty sets, inverted or NaN intervals and classes equal to `nodata`.
    pub fn validate(&self, nodata: i32) -> Result<()> {
        if self.0.is_empty() {
            return Err(GeoError::Validation("no classification rules given".into()));
        }
        for (index, rule) in self.0.iter().enumerate() {
            if rule.min.is_nan() || rule.max.is_nan() || rule.min > rule.max {
                return Err(GeoError::Validation(format!(
                    "rule {index} has an invalid interval [{}, {}]",
                    rule.min, rule.max
                )));
            }
            if rule.class == nodata {
                return Err(GeoError::Validation(format!(
                    "rule {index} maps to the nodata value {nodata}"
                )));
            }
        }
        Ok(())
    }

    pub fn classify(&self, value: f64) -> Option<i32> {
        self.0
            .iter()
            .rev()
            .find(|rule| rule.contains(value))
            .map(|rule| rule.class)
    }
}

impl From<Vec<(f64, f64, i32)>> for ClassificationRules {
    fn from(rules: Vec<(f64, f64, i32)>) -> Self {
        Self(
            rules
                .into_iter()
                .map(|(min, max, class)| ClassificationRule::new(min, max, class))
                .collect(),
        )
    }
}

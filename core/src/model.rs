//! The pre-trained regression model behind a trait.
//!
//! The engine only ever calls `FteModel::predict`. Swapping coefficients
//! (a new `fte_model.json`) or a whole implementation never touches callers.

use crate::{
    error::{StaffingError, StaffingResult},
    features::{FeatureColumn, FeatureVector},
    segment::Segment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A pure function from features to NET FTE.
pub trait FteModel: Send + Sync {
    /// Stable identifier for logs and result metadata.
    fn name(&self) -> &str;

    fn predict(&self, features: &FeatureVector) -> f64;
}

fn one() -> f64 {
    1.0
}

/// One standardised numeric term: coefficient × (x − mean) / scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTerm {
    pub column:      FeatureColumn,
    pub coefficient: f64,
    #[serde(default)]
    pub mean:        f64,
    #[serde(default = "one")]
    pub scale:       f64,
}

/// Ridge-style linear model: intercept, standardised numeric terms and a
/// one-hot offset per segment (the baseline segment has no entry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub name:            String,
    pub intercept:       f64,
    pub terms:           Vec<FeatureTerm>,
    #[serde(default)]
    pub segment_offsets: HashMap<Segment, f64>,
}

impl LinearModel {
    pub fn validate(&self) -> StaffingResult<()> {
        if !self.intercept.is_finite() {
            return Err(StaffingError::config(format!("model {}: intercept is not finite", self.name)));
        }
        for term in &self.terms {
            if !(term.coefficient.is_finite() && term.mean.is_finite()) {
                return Err(StaffingError::config(format!(
                    "model {}: term {} is not finite",
                    self.name,
                    term.column.name()
                )));
            }
            if !(term.scale.is_finite() && term.scale > 0.0) {
                return Err(StaffingError::config(format!(
                    "model {}: term {} has scale {}",
                    self.name,
                    term.column.name(),
                    term.scale
                )));
            }
        }
        Ok(())
    }

    pub fn coefficient(&self, column: FeatureColumn) -> Option<f64> {
        self.terms.iter().find(|t| t.column == column).map(|t| t.coefficient / t.scale)
    }
}

impl FteModel for LinearModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn predict(&self, features: &FeatureVector) -> f64 {
        let numeric: f64 = self
            .terms
            .iter()
            .map(|t| t.coefficient * (features.get(t.column) - t.mean) / t.scale)
            .sum();
        let offset = features
            .segment
            .and_then(|s| self.segment_offsets.get(&s))
            .copied()
            .unwrap_or(0.0);
        self.intercept + numeric + offset
    }
}

/// Everything that ships with a trained model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPackage {
    pub version: String,
    pub model: LinearModel,
    /// Residual standard deviation of the NET FTE fit.
    pub residual_std: f64,
    #[serde(default)]
    pub rx_time_factor: Option<f64>,
    /// Training medians for columns a caller does not supply.
    #[serde(default)]
    pub defaults: HashMap<FeatureColumn, f64>,
    /// Segment means the model's residual was computed against.
    #[serde(default)]
    pub segment_prod_means: HashMap<Segment, f64>,
}

impl ModelPackage {
    /// Load and validate. A missing or unreadable model is fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> StaffingResult<Self> {
        let path = path.as_ref();
        let unavailable = |reason: String| StaffingError::ModelUnavailable {
            path: path.display().to_string(),
            reason,
        };
        let content = std::fs::read_to_string(path).map_err(|e| unavailable(e.to_string()))?;
        let package: ModelPackage =
            serde_json::from_str(&content).map_err(|e| unavailable(e.to_string()))?;
        package.model.validate()?;
        if !(package.residual_std.is_finite() && package.residual_std >= 0.0) {
            return Err(unavailable(format!("residual_std {} is invalid", package.residual_std)));
        }
        log::info!(
            "model: loaded {} v{} ({} terms)",
            package.model.name,
            package.version,
            package.model.terms.len()
        );
        Ok(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(effective_bloky: f64, segment: Option<Segment>) -> FeatureVector {
        let mut values = [0.0; FeatureColumn::COUNT];
        values[FeatureColumn::EffectiveBloky.index()] = effective_bloky;
        FeatureVector { values, segment }
    }

    fn model() -> LinearModel {
        LinearModel {
            name: "test".into(),
            intercept: 1.0,
            terms: vec![FeatureTerm {
                column: FeatureColumn::EffectiveBloky,
                coefficient: 2.0,
                mean: 100_000.0,
                scale: 50_000.0,
            }],
            segment_offsets: [(Segment::Street, 0.5)].into(),
        }
    }

    #[test]
    fn standardised_terms_and_segment_offset() {
        let m = model();
        assert!((m.predict(&vector(150_000.0, None)) - 3.0).abs() < 1e-12);
        assert!((m.predict(&vector(150_000.0, Some(Segment::Street))) - 3.5).abs() < 1e-12);
        assert!((m.predict(&vector(150_000.0, Some(Segment::Shopping))) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn raw_unit_coefficient_accounts_for_scale() {
        assert_eq!(model().coefficient(FeatureColumn::EffectiveBloky), Some(2.0 / 50_000.0));
        assert_eq!(model().coefficient(FeatureColumn::Trzby), None);
    }

    #[test]
    fn zero_scale_is_rejected() {
        let mut m = model();
        m.terms[0].scale = 0.0;
        assert!(m.validate().is_err());
    }

    #[test]
    fn missing_model_file_is_model_unavailable() {
        let err = ModelPackage::load("/nonexistent/fte_model.json").unwrap_err();
        assert!(matches!(err, StaffingError::ModelUnavailable { .. }), "{err}");
    }

    #[test]
    fn package_parses_with_optional_sections_absent() {
        let json = r#"{
            "version": "5",
            "residual_std": 0.8,
            "model": {
                "name": "fte_ridge",
                "intercept": 0.2,
                "terms": [{"column": "effective_bloky", "coefficient": 0.00004}]
            }
        }"#;
        let package: ModelPackage = serde_json::from_str(json).unwrap();
        assert_eq!(package.model.terms[0].scale, 1.0);
        assert!(package.rx_time_factor.is_none());
        assert!(package.defaults.is_empty());
    }
}

use crate::{
    error::StaffingResult,
    features::FeatureSettings,
    gross::{ConversionMode, FactorTable, GrossFactorsFile},
    model::ModelPackage,
    revenue::{RiskCalibration, RiskFormula},
    segment::{SegmentProfilesFile, SegmentTable},
    triage::GapThresholds,
};
use serde::{Deserialize, Serialize};

/// Residual std used when no model package has been applied.
pub const DEFAULT_RESIDUAL_STD: f64 = 0.8;

/// Deployment policy: which strategies run and with what constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePolicy {
    #[serde(default)]
    pub conversion_mode: ConversionMode,
    #[serde(default)]
    pub risk_formula:    RiskFormula,
    #[serde(default)]
    pub risk:            RiskCalibration,
    #[serde(default)]
    pub thresholds:      GapThresholds,
    #[serde(default)]
    pub features:        FeatureSettings,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            conversion_mode: ConversionMode::default(),
            risk_formula:    RiskFormula::default(),
            risk:            RiskCalibration::default(),
            thresholds:      GapThresholds::default(),
            features:        FeatureSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy:           EnginePolicy,
    pub segments:         SegmentTable,
    pub pharmacy_factors: FactorTable,
    /// Residual std of the NET fit, for the tolerance band.
    pub residual_std:     f64,
}

impl EngineConfig {
    /// Load everything except the model from `data_dir`.
    /// The payroll factor table is optional; without it every pharmacy
    /// resolves to segment defaults.
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let policy_path = format!("{data_dir}/engine/engine_config.json");
        let policy_content = std::fs::read_to_string(&policy_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {policy_path}: {e}"))?;
        let policy: EnginePolicy = serde_json::from_str(&policy_content)?;

        let segments_path = format!("{data_dir}/segments/segment_profiles.json");
        let segments_content = std::fs::read_to_string(&segments_path)
            .map_err(|e| anyhow::anyhow!("Cannot read {segments_path}: {e}"))?;
        let segments_file: SegmentProfilesFile = serde_json::from_str(&segments_content)?;
        let segments = SegmentTable::new(segments_file.segments, segments_file.fallback)?;

        let payroll_path = format!("{data_dir}/payroll/gross_factors.json");
        let pharmacy_factors = if std::path::Path::new(&payroll_path).exists() {
            let payroll_content = std::fs::read_to_string(&payroll_path)
                .map_err(|e| anyhow::anyhow!("Cannot read {payroll_path}: {e}"))?;
            let payroll_file: GrossFactorsFile = serde_json::from_str(&payroll_content)?;
            FactorTable::new(payroll_file.factors, payroll_file.network_medians)?
        } else {
            log::info!("config: {payroll_path} not found, using segment default factors");
            FactorTable::empty()
        };

        log::info!(
            "config: loaded from {data_dir} (conversion={:?}, risk={:?}, {} payroll rows)",
            policy.conversion_mode,
            policy.risk_formula,
            pharmacy_factors.len()
        );

        Ok(Self { policy, segments, pharmacy_factors, residual_std: DEFAULT_RESIDUAL_STD })
    }

    /// Build a config for tests without requiring data files.
    pub fn default_test() -> Self {
        Self {
            policy:           EnginePolicy::default(),
            segments:         SegmentTable::builtin(),
            pharmacy_factors: FactorTable::empty(),
            residual_std:     DEFAULT_RESIDUAL_STD,
        }
    }

    /// Fold in what ships with the model: Rx factor, feature defaults,
    /// residual std and the segment means the residual was trained against.
    pub fn apply_model_package(&mut self, package: &ModelPackage) -> StaffingResult<()> {
        if let Some(rx) = package.rx_time_factor {
            self.policy.features.rx_time_factor = rx;
        }
        self.policy
            .features
            .defaults
            .extend(package.defaults.iter().map(|(c, v)| (*c, *v)));
        self.residual_std = package.residual_std;
        self.segments.override_mean_productivity(&package.segment_prod_means)?;
        Ok(())
    }
}

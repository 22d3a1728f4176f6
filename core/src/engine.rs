//! The staffing engine: one pipeline from inputs to a recommendation.
//!
//! PIPELINE (fixed order, every request):
//!   1. Validate inputs
//!   2. Resolve segment profile and conversion factors
//!   3. Build the feature vector
//!   4. Predict NET FTE (floored)
//!   5. Convert NET → GROSS, predicted and actual sides alike
//!   6. Productivity index, revenue at risk, gap triage
//!
//! RULES:
//!   - Construction does all I/O. `predict` never touches disk or blocks.
//!   - The engine holds only read-only state and is `Send + Sync`.
//!   - Manual requests, record requests and sensitivity runs share `predict`.

use crate::{
    config::EngineConfig,
    error::{StaffingError, StaffingResult},
    features::{FeatureBuilder, FeatureColumn, FeatureInputs, ProductivitySignal},
    gross::{
        resolve_conversion_factors, ConversionMode, FactorTable, GrossConverter, GrossStaffing,
        NetStaffing, ResolvedFactors,
    },
    model::{FteModel, ModelPackage},
    predictor::NetFtePredictor,
    productivity::{
        CohortKey, CohortRank, ProductivityCohorts, ProductivityIndex, ProductivityIndexer,
        VolumeCohorts, VolumeIndex,
    },
    record::{non_negative, share, PharmacyRecord},
    revenue::{RevenueAtRisk, RevenueAtRiskEstimator, RiskInputs},
    segment::{Segment, SegmentTable},
    sensitivity::{Sensitivity, SensitivityAnalyzer},
    triage::{GapThresholds, GapTriage, NetworkSummary},
    types::{round_to, PharmacyId, RoleBreakdown},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Decimals for display figures.
const DISPLAY_DECIMALS: i32 = 1;
/// The lower tolerance bound never drops below one GROSS FTE.
const MIN_TOLERANCE_FTE: f64 = 1.0;

/// Staffing as it is today, from the record store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurrentStaffing {
    pub net_roles:    RoleBreakdown,
    pub absence_fte:  f64,
    /// Transactions per staff-hour.
    pub productivity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffingRequest {
    pub bloky:          f64,
    pub trzby:          f64,
    /// `None` when the label did not parse; the fallback profile applies.
    pub segment:        Option<Segment>,
    pub podiel_rx:      f64,
    pub productivity_z: f64,
    pub variability_z:  f64,
    pub pharmacy_id:    Option<PharmacyId>,
    /// Payroll absence for the predicted side. When absent in
    /// absence-offset mode, the absence implied by the factors is used.
    pub absence_fte:    Option<f64>,
    /// Year-over-year change in transactions, as a fraction (0.2 = +20 %).
    pub bloky_trend:    Option<f64>,
    pub current:        Option<CurrentStaffing>,
    pub overrides:      BTreeMap<FeatureColumn, f64>,
}

impl StaffingRequest {
    /// A manual request: neutral productivity and variability, no pharmacy.
    pub fn new(bloky: f64, trzby: f64, segment: Option<Segment>, podiel_rx: f64) -> Self {
        Self {
            bloky,
            trzby,
            segment,
            podiel_rx,
            productivity_z: 0.0,
            variability_z:  0.0,
            pharmacy_id:    None,
            absence_fte:    None,
            bloky_trend:    None,
            current:        None,
            overrides:      BTreeMap::new(),
        }
    }

    pub fn with_productivity_z(mut self, z: f64) -> Self {
        self.productivity_z = z;
        self
    }

    pub fn with_variability_z(mut self, z: f64) -> Self {
        self.variability_z = z;
        self
    }

    pub fn with_pharmacy(mut self, id: PharmacyId) -> Self {
        self.pharmacy_id = Some(id);
        self
    }

    pub fn with_absence(mut self, absence_fte: f64) -> Self {
        self.absence_fte = Some(absence_fte);
        self
    }

    pub fn with_bloky_trend(mut self, trend: f64) -> Self {
        self.bloky_trend = Some(trend);
        self
    }

    pub fn with_current(mut self, current: CurrentStaffing) -> Self {
        self.current = Some(current);
        self
    }

    pub fn validate(&self) -> StaffingResult<()> {
        non_negative("bloky", self.bloky)?;
        non_negative("trzby", self.trzby)?;
        share("podiel_rx", self.podiel_rx)?;
        finite("productivity_z", self.productivity_z)?;
        finite("variability_z", self.variability_z)?;
        if let Some(absence) = self.absence_fte {
            non_negative("absence_fte", absence)?;
        }
        if let Some(trend) = self.bloky_trend {
            finite("bloky_trend", trend)?;
        }
        if let Some(current) = &self.current {
            if !current.net_roles.is_non_negative() {
                return Err(StaffingError::InvalidInput {
                    field: "current.net_roles",
                    value: current.net_roles.total(),
                });
            }
            non_negative("current.absence_fte", current.absence_fte)?;
            non_negative("current.productivity", current.productivity)?;
        }
        for value in self.overrides.values() {
            finite("overrides", *value)?;
        }
        Ok(())
    }
}

fn finite(field: &'static str, value: f64) -> StaffingResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StaffingError::InvalidInput { field, value })
    }
}

/// Rounded figures for presentation. `total` is the sum of the rounded
/// roles, so the breakdown always adds up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayFte {
    pub roles: RoleBreakdown,
    pub total: f64,
}

impl DisplayFte {
    fn from_gross(gross: &GrossStaffing) -> Self {
        let roles = gross.roles.map(|v| round_to(v, DISPLAY_DECIMALS));
        Self { roles, total: round_to(roles.total(), DISPLAY_DECIMALS) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBand {
    pub tolerance: f64,
    pub min:       f64,
    pub max:       f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffingPrediction {
    pub pharmacy_id:       Option<PharmacyId>,
    pub segment:           Option<Segment>,
    pub model:             String,
    pub effective_bloky:   f64,
    pub predicted_net:     f64,
    pub predicted:         GrossStaffing,
    pub actual:            Option<GrossStaffing>,
    /// predicted − actual GROSS. Positive = understaffed.
    pub fte_gap:           Option<f64>,
    pub display:           DisplayFte,
    pub tolerance:         ToleranceBand,
    pub conversion_mode:   ConversionMode,
    /// Per-role factors resolved for this pharmacy (payroll, network median
    /// or segment default).
    pub conversion:        ResolvedFactors,
    /// Whether `conversion.factors` entered the GROSS figures. Role-proportion
    /// mode always applies them. Absence-offset mode adds a payroll absence
    /// instead, so the factors only count when the absence had to be estimated
    /// from them (a manual request without an absence figure).
    pub factors_in_gross:  bool,
    pub productivity:      Option<ProductivityIndex>,
    /// Cohort the pharmacy is ranked in; `None` for manual requests with an
    /// unparsed segment.
    pub cohort:            Option<CohortKey>,
    pub cohort_rank:       Option<CohortRank>,
    /// Transactions and revenue against the cohort mean (100 = average).
    /// Filled by network assessment.
    pub volume_index:      Option<VolumeIndex>,
    /// EUR under the configured formula; 0 when any gate failed.
    pub revenue_at_risk:   u64,
    pub risk:              Option<RevenueAtRisk>,
    pub triage:            Option<GapTriage>,
    pub is_small_pharmacy: bool,
}

/// A batch result over a record set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkAssessment {
    pub predictions: Vec<StaffingPrediction>,
    /// Records rejected by validation, with the reason.
    pub skipped:     Vec<(PharmacyId, String)>,
    pub summary:     NetworkSummary,
}

#[derive(Debug, Clone)]
pub struct StaffingEngine {
    segments:         SegmentTable,
    pharmacy_factors: FactorTable,
    features:         FeatureBuilder,
    predictor:        NetFtePredictor,
    converter:        GrossConverter,
    indexer:          ProductivityIndexer,
    estimator:        RevenueAtRiskEstimator,
    thresholds:       GapThresholds,
    residual_std:     f64,
}

impl StaffingEngine {
    pub fn new(config: EngineConfig, model: Arc<dyn FteModel>) -> StaffingResult<Self> {
        config.segments.validate()?;
        if !(config.residual_std.is_finite() && config.residual_std >= 0.0) {
            return Err(StaffingError::config(format!(
                "residual_std {} is invalid",
                config.residual_std
            )));
        }
        let policy = config.policy;
        log::info!(
            "engine: model={} conversion={:?} risk={:?}",
            model.name(),
            policy.conversion_mode,
            policy.risk_formula
        );
        Ok(Self {
            segments:         config.segments,
            pharmacy_factors: config.pharmacy_factors,
            features:         FeatureBuilder::new(policy.features),
            predictor:        NetFtePredictor::new(model),
            converter:        GrossConverter::new(policy.conversion_mode),
            indexer:          ProductivityIndexer::new(),
            estimator:        RevenueAtRiskEstimator::new(policy.risk_formula, policy.risk),
            thresholds:       policy.thresholds,
            residual_std:     config.residual_std,
        })
    }

    /// Load config and model from `data_dir`. Fails if the model is missing.
    pub fn load(data_dir: &str) -> StaffingResult<Self> {
        let mut config = EngineConfig::load(data_dir)?;
        let package = ModelPackage::load(format!("{data_dir}/model/fte_model.json"))?;
        config.apply_model_package(&package)?;
        Self::new(config, Arc::new(package.model))
    }

    /// Build an engine on the in-code test config.
    pub fn build_test(model: Arc<dyn FteModel>) -> StaffingResult<Self> {
        Self::new(EngineConfig::default_test(), model)
    }

    pub fn segments(&self) -> &SegmentTable {
        &self.segments
    }

    pub fn conversion_mode(&self) -> ConversionMode {
        self.converter.mode()
    }

    pub fn model_name(&self) -> &str {
        self.predictor.model_name()
    }

    pub fn resolve_conversion_factors(
        &self,
        pharmacy_id: Option<PharmacyId>,
        segment: Option<Segment>,
    ) -> ResolvedFactors {
        resolve_conversion_factors(&self.pharmacy_factors, &self.segments, pharmacy_id, segment)
    }

    pub fn predict(&self, request: &StaffingRequest) -> StaffingResult<StaffingPrediction> {
        request.validate()?;

        let profile = self.segments.profile(request.segment);
        let conversion = self.resolve_conversion_factors(request.pharmacy_id, request.segment);
        let proportions = &profile.role_proportions;

        let productivity_signal = match &request.current {
            Some(c) => ProductivitySignal::Residual(c.productivity - profile.mean_productivity),
            None    => ProductivitySignal::ZScore(request.productivity_z),
        };
        let inputs = FeatureInputs {
            bloky:         request.bloky,
            trzby:         request.trzby,
            segment:       request.segment,
            podiel_rx:     request.podiel_rx,
            productivity:  productivity_signal,
            variability_z: request.variability_z,
            overrides:     request.overrides.clone(),
        };
        let features = self.features.build(&inputs);
        let predicted_net = self.predictor.predict(&features);

        let (predicted, actual) = match &request.current {
            Some(current) => {
                let actual_net = NetStaffing { roles: current.net_roles, absence_fte: current.absence_fte };
                let cmp = self.converter.compare(predicted_net, &actual_net, proportions, &conversion.factors);
                (cmp.predicted, Some(cmp.actual))
            }
            None => {
                let roles = proportions.scale(predicted_net);
                let absence_fte = request
                    .absence_fte
                    .unwrap_or_else(|| conversion.factors.expected_absence(&roles));
                let net = NetStaffing { roles, absence_fte };
                (self.converter.to_gross(&net, proportions, &conversion.factors), None)
            }
        };
        let fte_gap = actual.map(|a| predicted.total - a.total);
        let factors_in_gross = match self.converter.mode() {
            ConversionMode::RoleProportion => true,
            ConversionMode::AbsenceOffset  => request.current.is_none() && request.absence_fte.is_none(),
        };

        let productivity = request
            .current
            .map(|c| self.indexer.index(c.productivity, profile.mean_productivity));

        let risk = match (&actual, &productivity) {
            (Some(actual), Some(productivity)) => {
                let inputs = RiskInputs {
                    predicted_gross: predicted.total,
                    actual_gross:    actual.total,
                    revenue:         request.trzby,
                    rx_share:        request.podiel_rx,
                };
                Some(self.estimator.estimate(&inputs, productivity, profile))
            }
            _ => None,
        };

        let triage = match (fte_gap, &productivity) {
            (Some(gap), Some(p)) => {
                Some(self.thresholds.classify(gap, p.is_above_average, request.bloky_trend))
            }
            _ => None,
        };
        let is_small_pharmacy = request
            .current
            .map_or(false, |c| self.thresholds.is_small_pharmacy(&c.net_roles));

        let tolerance = self.residual_std * conversion.factors.mean();
        let tolerance = ToleranceBand {
            tolerance,
            min: (predicted.total - tolerance).max(MIN_TOLERANCE_FTE),
            max: predicted.total + tolerance,
        };

        log::debug!(
            "predict: pharmacy={:?} segment={:?} net={:.2} gross={:.2} gap={:?}",
            request.pharmacy_id,
            request.segment,
            predicted_net,
            predicted.total,
            fte_gap
        );

        Ok(StaffingPrediction {
            pharmacy_id: request.pharmacy_id,
            segment: request.segment,
            model: self.predictor.model_name().to_string(),
            effective_bloky: features.get(FeatureColumn::EffectiveBloky),
            predicted_net,
            display: DisplayFte::from_gross(&predicted),
            predicted,
            actual,
            fte_gap,
            tolerance,
            conversion_mode: self.converter.mode(),
            conversion,
            factors_in_gross,
            productivity,
            cohort: request.segment.map(CohortKey::from),
            cohort_rank: None,
            volume_index: None,
            revenue_at_risk: risk.map_or(0, |r| r.eur()),
            risk,
            triage,
            is_small_pharmacy,
        })
    }

    /// Translate a stored record into a full request.
    pub fn request_for(&self, record: &PharmacyRecord) -> StaffingResult<StaffingRequest> {
        record.validate()?;
        Ok(StaffingRequest {
            bloky:          record.bloky,
            trzby:          record.trzby,
            segment:        self.segments.resolve_label(&record.typ),
            podiel_rx:      record.podiel_rx,
            productivity_z: 0.0,
            variability_z:  0.0,
            pharmacy_id:    Some(record.id),
            absence_fte:    Some(record.absence_fte),
            bloky_trend:    record.bloky_trend,
            current:        Some(CurrentStaffing {
                net_roles:    record.staff_net,
                absence_fte:  record.absence_fte,
                productivity: record.productivity,
            }),
            overrides:      record.features.clone(),
        })
    }

    /// Predict a stored record. Its cohort follows the raw `typ`, so
    /// unparsed labels are not pooled together.
    pub fn predict_record(&self, record: &PharmacyRecord) -> StaffingResult<StaffingPrediction> {
        let mut prediction = self.predict(&self.request_for(record)?)?;
        prediction.cohort = Some(CohortKey::from_label(&record.typ));
        Ok(prediction)
    }

    pub fn sensitivity(
        &self,
        bloky: f64,
        trzby: f64,
        podiel_rx: f64,
        segment: Option<Segment>,
    ) -> StaffingResult<Sensitivity> {
        SensitivityAnalyzer::new(self).analyze(bloky, trzby, podiel_rx, segment)
    }

    /// Predict every record, ranking productivity and volume within cohorts
    /// built from the same records. Invalid records are skipped and listed.
    pub fn assess_network(&self, records: &[PharmacyRecord]) -> NetworkAssessment {
        let valid: Vec<&PharmacyRecord> = records.iter().filter(|r| r.validate().is_ok()).collect();
        let cohorts = ProductivityCohorts::from_values(
            valid.iter().map(|r| (CohortKey::from_label(&r.typ), r.productivity)),
        );
        let volumes = VolumeCohorts::from_values(
            valid.iter().map(|r| (CohortKey::from_label(&r.typ), r.bloky, r.trzby)),
        );

        let mut predictions = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();
        for record in records {
            match self.predict_record(record) {
                Ok(mut prediction) => {
                    let key = CohortKey::from_label(&record.typ);
                    prediction.cohort_rank = cohorts.rank(&key, record.productivity);
                    prediction.volume_index = volumes.index(&key, record.bloky, record.trzby);
                    predictions.push(prediction);
                }
                Err(e) => {
                    log::warn!("assess: skipping pharmacy {}: {e}", record.id);
                    skipped.push((record.id, e.to_string()));
                }
            }
        }

        let summary = NetworkSummary::from_predictions(&predictions, &self.thresholds);
        log::info!(
            "assess: {} pharmacies, {} skipped, {} urgent, {} monitor, gap {:+.1} FTE ({:+.1} %), revenue at risk {} EUR",
            summary.totals.pharmacies,
            skipped.len(),
            summary.urgent,
            summary.monitor,
            summary.totals.total_gap,
            summary.totals.diff_pct,
            summary.totals.revenue_at_risk
        );
        NetworkAssessment { predictions, skipped, summary }
    }
}

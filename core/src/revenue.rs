//! Revenue at risk: annual EUR lost because understaffing turns away demand.
//!
//! Gates (shared by every formula), all must pass or the result is 0:
//!   1. actual GROSS FTE > 0
//!   2. predicted > actual, compared at display rounding (one decimal)
//!   3. revenue > 0
//!   4. productivity above the segment mean
//!
//! Gate 4: an under-efficient pharmacy fixes process before staffing is
//! credited with lost revenue.
//!
//! v1 passes a flat share of the overload ratio onto revenue. v2 concentrates
//! overload in peak hours, splits Rx / non-Rx elasticity, scales by how far
//! above average the pharmacy runs, applies segment competition and caps.

use crate::{
    productivity::ProductivityIndex,
    segment::SegmentProfile,
    types::round_to,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFormula {
    V1,
    #[default]
    V2,
}

/// Calibration constants. Fitted to one POS dataset; configuration, not law.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskCalibration {
    /// Wait-time elasticity of prescription revenue.
    pub rx_elasticity:       f64,
    /// Wait-time elasticity of walk-in / OTC revenue.
    pub non_rx_elasticity:   f64,
    /// Ceiling on v2 as a share of annual revenue.
    pub max_revenue_share:   f64,
    /// v1 pass-through of the overload ratio.
    pub v1_pass_through:     f64,
    /// Decimals used for the understaffing gate.
    pub gate_decimals:       i32,
}

impl Default for RiskCalibration {
    fn default() -> Self {
        Self {
            rx_elasticity:     0.05,
            non_rx_elasticity: 0.20,
            max_revenue_share: 0.15,
            v1_pass_through:   0.5,
            gate_decimals:     1,
        }
    }
}

/// Which gate stopped the estimate, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskGate {
    NoActualStaff,
    NotUnderstaffed,
    NoRevenue,
    BelowAverageProductivity,
    Passed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskInputs {
    pub predicted_gross: f64,
    pub actual_gross:    f64,
    pub revenue:         f64,
    pub rx_share:        f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RevenueAtRisk {
    pub v1:      u64,
    pub v2:      u64,
    pub gate:    RiskGate,
    pub formula: RiskFormula,
}

impl RevenueAtRisk {
    /// The figure for the configured formula.
    pub fn eur(&self) -> u64 {
        match self.formula {
            RiskFormula::V1 => self.v1,
            RiskFormula::V2 => self.v2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevenueAtRiskEstimator {
    formula:     RiskFormula,
    calibration: RiskCalibration,
}

impl RevenueAtRiskEstimator {
    pub fn new(formula: RiskFormula, calibration: RiskCalibration) -> Self {
        Self { formula, calibration }
    }

    pub fn formula(&self) -> RiskFormula {
        self.formula
    }

    pub fn gate(&self, inputs: &RiskInputs, productivity: &ProductivityIndex) -> RiskGate {
        let d = self.calibration.gate_decimals;
        let actual = round_to(inputs.actual_gross, d);
        let predicted = round_to(inputs.predicted_gross, d);
        if !(actual > 0.0) {
            RiskGate::NoActualStaff
        } else if !(predicted > actual) {
            RiskGate::NotUnderstaffed
        } else if !(inputs.revenue > 0.0) {
            RiskGate::NoRevenue
        } else if !productivity.is_above_average {
            RiskGate::BelowAverageProductivity
        } else {
            RiskGate::Passed
        }
    }

    /// Simple overload on the rounded FTE values. Kept for comparison.
    pub fn v1(&self, inputs: &RiskInputs, productivity: &ProductivityIndex) -> u64 {
        if self.gate(inputs, productivity) != RiskGate::Passed {
            return 0;
        }
        let d = self.calibration.gate_decimals;
        let ratio = round_to(inputs.predicted_gross, d) / round_to(inputs.actual_gross, d);
        to_eur((ratio - 1.0) * self.calibration.v1_pass_through * inputs.revenue)
    }

    /// Peak-hour amplified estimate, capped.
    pub fn v2(
        &self,
        inputs: &RiskInputs,
        productivity: &ProductivityIndex,
        profile: &SegmentProfile,
    ) -> u64 {
        if self.gate(inputs, productivity) != RiskGate::Passed {
            return 0;
        }
        let Some(productivity_ratio) = productivity.ratio() else {
            return 0;
        };
        let c = &self.calibration;

        let base_overload = inputs.predicted_gross / inputs.actual_gross - 1.0;
        let peak_overload = base_overload * profile.peak_overload_ratio;
        let peak_revenue = inputs.revenue * profile.peak_revenue_share;

        let rx = inputs.rx_share.clamp(0.0, 1.0);
        let blended_sensitivity = rx * c.rx_elasticity + (1.0 - rx) * c.non_rx_elasticity;

        let base_at_risk = peak_overload * blended_sensitivity * peak_revenue;
        let productivity_multiplier = productivity_ratio - 1.0;
        let scaled = base_at_risk * (1.0 + productivity_multiplier);
        let with_competition = scaled * profile.competition_factor;

        let cap = inputs.revenue * c.max_revenue_share;
        to_eur(with_competition.min(cap))
    }

    pub fn estimate(
        &self,
        inputs: &RiskInputs,
        productivity: &ProductivityIndex,
        profile: &SegmentProfile,
    ) -> RevenueAtRisk {
        let gate = self.gate(inputs, productivity);
        let result = RevenueAtRisk {
            v1: self.v1(inputs, productivity),
            v2: self.v2(inputs, productivity, profile),
            gate,
            formula: self.formula,
        };
        log::debug!("revenue at risk: gate={gate:?} v1={} v2={}", result.v1, result.v2);
        result
    }
}

/// Truncate to whole euros; negatives and NaN become 0.
fn to_eur(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{productivity::ProductivityIndexer, segment::{Segment, SegmentTable}};

    fn estimator() -> RevenueAtRiskEstimator {
        RevenueAtRiskEstimator::new(RiskFormula::V2, RiskCalibration::default())
    }

    fn inputs(predicted: f64, actual: f64, revenue: f64, rx: f64) -> RiskInputs {
        RiskInputs { predicted_gross: predicted, actual_gross: actual, revenue, rx_share: rx }
    }

    #[test]
    fn v1_flat_pass_through() {
        let above = ProductivityIndexer::new().index(9.0, 7.25);
        let eur = estimator().v1(&inputs(6.0, 4.0, 1_000_000.0, 0.5), &above);
        assert_eq!(eur, 250_000);
    }

    #[test]
    fn v2_worked_example() {
        // 25 % overload, street segment (share 0.50, ratio 2.5, competition 1.0),
        // no Rx → sensitivity 0.20, productivity ratio 1.5.
        let table = SegmentTable::builtin();
        let profile = table.profile(Some(Segment::Street));
        let prod = ProductivityIndexer::new().index(9.0, 6.0);
        let eur = estimator().v2(&inputs(5.0, 4.0, 1_000_001.0, 0.0), &prod, profile);
        // 0.25 × 2.5 × 0.20 × 500 000.5 × 1.5 × 1.0 = 93 750.09
        assert_eq!(eur, 93_750);
    }

    #[test]
    fn v2_is_capped() {
        let table = SegmentTable::builtin();
        let profile = table.profile(Some(Segment::ShoppingPremium));
        let prod = ProductivityIndexer::new().index(30.0, 7.25);
        let eur = estimator().v2(&inputs(20.0, 2.0, 800_000.0, 0.0), &prod, profile);
        assert_eq!(eur, 120_000);
    }

    #[test]
    fn gate_uses_rounded_values() {
        let prod = ProductivityIndexer::new().index(9.0, 7.0);
        // 5.04 and 5.01 both display as 5.0.
        let gate = estimator().gate(&inputs(5.04, 5.01, 1_000_000.0, 0.5), &prod);
        assert_eq!(gate, RiskGate::NotUnderstaffed);
    }

    #[test]
    fn gates_report_first_failure() {
        let e = estimator();
        let above = ProductivityIndexer::new().index(9.0, 7.0);
        let below = ProductivityIndexer::new().index(6.0, 7.0);
        assert_eq!(e.gate(&inputs(5.0, 0.0, 1.0e6, 0.5), &above), RiskGate::NoActualStaff);
        assert_eq!(e.gate(&inputs(4.0, 5.0, 1.0e6, 0.5), &above), RiskGate::NotUnderstaffed);
        assert_eq!(e.gate(&inputs(6.0, 5.0, 0.0, 0.5), &above), RiskGate::NoRevenue);
        assert_eq!(e.gate(&inputs(6.0, 5.0, 1.0e6, 0.5), &below), RiskGate::BelowAverageProductivity);
        assert_eq!(e.gate(&inputs(6.0, 5.0, 1.0e6, 0.5), &above), RiskGate::Passed);
    }

    #[test]
    fn estimate_reports_configured_formula() {
        let table = SegmentTable::builtin();
        let profile = table.profile(Some(Segment::Shopping));
        let prod = ProductivityIndexer::new().index(10.0, 9.14);
        let i = inputs(6.0, 5.0, 2_000_000.0, 0.4);

        let v1 = RevenueAtRiskEstimator::new(RiskFormula::V1, RiskCalibration::default());
        let r1 = v1.estimate(&i, &prod, profile);
        assert_eq!(r1.eur(), r1.v1);

        let r2 = estimator().estimate(&i, &prod, profile);
        assert_eq!(r2.eur(), r2.v2);
        assert_eq!(r1.v1, r2.v1);
        assert_eq!(r1.v2, r2.v2);
    }

    #[test]
    fn to_eur_truncates_and_floors() {
        assert_eq!(to_eur(1234.99), 1234);
        assert_eq!(to_eur(-5.0), 0);
        assert_eq!(to_eur(f64::NAN), 0);
    }
}

//! NET → GROSS FTE conversion.
//!
//! GROSS is contracted headcount: NET floor time plus paid absence.
//! Two strategies exist and a deployment picks exactly one:
//!   - RoleProportion: GROSS = Σ_role NET_role × factor_role
//!   - AbsenceOffset:  GROSS = NET + fte_n
//!
//! RULE: `GrossConverter::to_gross` is the only conversion. It runs once
//! for the predicted side and once for the actual side, with the same
//! factors, so the gap never comes from mixing formulas.

use crate::{
    error::{StaffingError, StaffingResult},
    segment::{Segment, SegmentTable},
    types::{PharmacyId, RoleBreakdown},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-role NET → GROSS multipliers. Each is >= 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversionFactors(RoleBreakdown);

impl ConversionFactors {
    pub const fn new(pharmacist: f64, assistant: f64, deputy: f64) -> Self {
        Self(RoleBreakdown::new(pharmacist, assistant, deputy))
    }

    pub fn roles(&self) -> &RoleBreakdown {
        &self.0
    }

    pub fn mean(&self) -> f64 {
        self.0.total() / 3.0
    }

    /// Multiply each role's NET by its factor.
    pub fn apply(&self, net_roles: &RoleBreakdown) -> RoleBreakdown {
        net_roles.zip(&self.0, |net, factor| net * factor)
    }

    /// Absence FTE these factors imply for a NET role split. Used when a
    /// request carries no payroll absence figure.
    pub fn expected_absence(&self, net_roles: &RoleBreakdown) -> f64 {
        net_roles.zip(&self.0, |n, f| n * (f - 1.0)).total()
    }

    pub fn validate(&self) -> Result<(), String> {
        let f = &self.0;
        for v in [f.pharmacist, f.assistant, f.deputy] {
            if !(v.is_finite() && v >= 1.0) {
                return Err(format!("conversion factors must be >= 1.0, got {f:?}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorSource {
    /// Derived from this pharmacy's payroll.
    PharmacySpecific,
    /// The segment profile default.
    SegmentDefault,
    /// Unrecognised segment: network-wide payroll medians.
    NetworkMedian,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolvedFactors {
    pub factors: ConversionFactors,
    pub source:  FactorSource,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GrossFactorsFile {
    #[serde(default)]
    pub factors: HashMap<PharmacyId, ConversionFactors>,
    #[serde(default)]
    pub network_medians: Option<ConversionFactors>,
}

/// Pharmacy-specific factors from payroll data. May be empty.
#[derive(Debug, Clone, Default)]
pub struct FactorTable {
    factors: HashMap<PharmacyId, ConversionFactors>,
    network_medians: Option<ConversionFactors>,
}

impl FactorTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Rows with a factor below 1.0 are payroll anomalies; they are dropped
    /// so those pharmacies resolve to their segment default.
    pub fn new(
        factors: HashMap<PharmacyId, ConversionFactors>,
        network_medians: Option<ConversionFactors>,
    ) -> StaffingResult<Self> {
        if let Some(medians) = &network_medians {
            medians
                .validate()
                .map_err(|reason| StaffingError::config(format!("network medians: {reason}")))?;
        }
        let total = factors.len();
        let factors: HashMap<_, _> = factors
            .into_iter()
            .filter(|(id, f)| match f.validate() {
                Ok(()) => true,
                Err(reason) => {
                    log::warn!("gross factors: dropping pharmacy {id}: {reason}");
                    false
                }
            })
            .collect();
        log::info!("gross factors: {} of {total} pharmacy rows usable", factors.len());
        Ok(Self { factors, network_medians })
    }

    pub fn get(&self, pharmacy_id: PharmacyId) -> Option<&ConversionFactors> {
        self.factors.get(&pharmacy_id)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

/// The one fallback chain for conversion factors:
/// pharmacy payroll → segment default → network median → fallback profile.
pub fn resolve_conversion_factors(
    pharmacy_factors: &FactorTable,
    segments: &SegmentTable,
    pharmacy_id: Option<PharmacyId>,
    segment: Option<Segment>,
) -> ResolvedFactors {
    if let Some(factors) = pharmacy_id.and_then(|id| pharmacy_factors.get(id)) {
        return ResolvedFactors { factors: *factors, source: FactorSource::PharmacySpecific };
    }
    if let Some(id) = pharmacy_id {
        log::debug!("gross factors: no payroll factors for pharmacy {id}, using segment default");
    }
    match (segment, pharmacy_factors.network_medians) {
        (None, Some(medians)) => ResolvedFactors { factors: medians, source: FactorSource::NetworkMedian },
        _ => ResolvedFactors {
            factors: segments.profile(segment).gross_factors,
            source:  FactorSource::SegmentDefault,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    RoleProportion,
    #[default]
    AbsenceOffset,
}

/// NET staffing on one side of the comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetStaffing {
    pub roles:       RoleBreakdown,
    /// Absence FTE from payroll (fte_n).
    pub absence_fte: f64,
}

impl NetStaffing {
    /// Split a NET total into roles by segment proportions.
    pub fn from_total(net: f64, proportions: &RoleBreakdown, absence_fte: f64) -> Self {
        Self { roles: proportions.scale(net), absence_fte }
    }

    pub fn total(&self) -> f64 {
        self.roles.total()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrossStaffing {
    pub net:   f64,
    pub total: f64,
    pub roles: RoleBreakdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaffingComparison {
    pub predicted: GrossStaffing,
    pub actual:    GrossStaffing,
    /// predicted − actual. Positive = understaffed.
    pub gap:       f64,
}

#[derive(Debug, Clone, Copy)]
pub struct GrossConverter {
    mode: ConversionMode,
}

impl GrossConverter {
    pub fn new(mode: ConversionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ConversionMode {
        self.mode
    }

    pub fn to_gross(
        &self,
        net: &NetStaffing,
        proportions: &RoleBreakdown,
        factors: &ConversionFactors,
    ) -> GrossStaffing {
        let net_total = net.total();
        match self.mode {
            ConversionMode::RoleProportion => {
                let roles = factors.apply(&net.roles);
                GrossStaffing { net: net_total, total: roles.total(), roles }
            }
            ConversionMode::AbsenceOffset => {
                let absence = proportions.scale(net.absence_fte);
                let roles = net.roles.zip(&absence, |n, a| n + a);
                GrossStaffing { net: net_total, total: net_total + net.absence_fte, roles }
            }
        }
    }

    /// Convert both sides with the same function and factors.
    pub fn compare(
        &self,
        predicted_net: f64,
        actual: &NetStaffing,
        proportions: &RoleBreakdown,
        factors: &ConversionFactors,
    ) -> StaffingComparison {
        let predicted_side = NetStaffing::from_total(predicted_net, proportions, actual.absence_fte);
        let predicted = self.to_gross(&predicted_side, proportions, factors);
        let actual = self.to_gross(actual, proportions, factors);
        StaffingComparison { predicted, actual, gap: predicted.total - actual.total }
    }
}

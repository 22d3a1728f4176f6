//! Predicted and actual GROSS come from the same conversion, in either mode,
//! with whatever factors resolve for the pharmacy.

use pharmstaff_core::{
    config::EngineConfig,
    engine::{CurrentStaffing, StaffingEngine, StaffingRequest},
    features::FeatureVector,
    gross::{ConversionFactors, ConversionMode, FactorSource, FactorTable},
    model::FteModel,
    segment::Segment,
    types::RoleBreakdown,
};
use std::collections::HashMap;
use std::sync::Arc;

// ── Helpers ────────────────────────────────────────────────────

struct FixedNet(f64);

impl FteModel for FixedNet {
    fn name(&self) -> &str {
        "fixed-net"
    }
    fn predict(&self, _: &FeatureVector) -> f64 {
        self.0
    }
}

const PHARMACY: u32 = 25;
const PAYROLL: ConversionFactors = ConversionFactors::new(1.35, 1.10, 1.28);

fn engine(mode: ConversionMode, net: f64) -> StaffingEngine {
    let mut config = EngineConfig::default_test();
    config.policy.conversion_mode = mode;
    config.pharmacy_factors =
        FactorTable::new(HashMap::from([(PHARMACY, PAYROLL)]), Some(ConversionFactors::new(1.2, 1.2, 1.2)))
            .unwrap();
    StaffingEngine::new(config, Arc::new(FixedNet(net))).unwrap()
}

fn request(segment: Segment, current: CurrentStaffing) -> StaffingRequest {
    StaffingRequest::new(70_000.0, 1_300_000.0, Some(segment), 0.55)
        .with_pharmacy(PHARMACY)
        .with_current(current)
}

// ── Symmetry ───────────────────────────────────────────────────

/// Staffing exactly at the predicted split gives a zero gap in both modes.
#[test]
fn matching_staff_has_zero_gap_in_both_modes() {
    for mode in [ConversionMode::RoleProportion, ConversionMode::AbsenceOffset] {
        let e = engine(mode, 4.0);
        let props = e.segments().profile(Some(Segment::StreetPlus)).role_proportions;
        let current = CurrentStaffing { net_roles: props.scale(4.0), absence_fte: 0.9, productivity: 7.0 };
        let p = e.predict(&request(Segment::StreetPlus, current)).unwrap();
        assert!(p.fte_gap.unwrap().abs() < 1e-9, "{mode:?}: gap {:?}", p.fte_gap);
    }
}

/// Role-proportion mode applies the pharmacy's payroll factors to both sides.
#[test]
fn role_proportion_uses_payroll_factors_on_both_sides() {
    let e = engine(ConversionMode::RoleProportion, 4.0);
    let current = CurrentStaffing {
        net_roles: RoleBreakdown::new(1.0, 1.0, 1.0),
        absence_fte: 0.0,
        productivity: 7.0,
    };
    let p = e.predict(&request(Segment::Street, current)).unwrap();
    assert_eq!(p.conversion.source, FactorSource::PharmacySpecific);

    let actual = p.actual.unwrap();
    assert!((actual.total - (1.35 + 1.10 + 1.28)).abs() < 1e-9);

    let props = e.segments().profile(Some(Segment::Street)).role_proportions;
    let expected = props.scale(4.0).zip(PAYROLL.roles(), |n, f| n * f).total();
    assert!((p.predicted.total - expected).abs() < 1e-9);
    assert!((p.fte_gap.unwrap() - (expected - actual.total)).abs() < 1e-9);
}

/// Absence-offset mode adds the same fte_n to both sides, so the gap is the NET gap.
#[test]
fn absence_offset_gap_equals_net_gap() {
    let e = engine(ConversionMode::AbsenceOffset, 4.0);
    let current = CurrentStaffing {
        net_roles: RoleBreakdown::new(1.2, 1.0, 0.8),
        absence_fte: 1.4,
        productivity: 7.0,
    };
    let p = e.predict(&request(Segment::Shopping, current)).unwrap();
    assert!((p.fte_gap.unwrap() - 1.0).abs() < 1e-9);
    assert!((p.actual.unwrap().total - 4.4).abs() < 1e-9);
}

/// The factors count towards GROSS in role-proportion mode; in
/// absence-offset mode only when there was no absence figure to add.
#[test]
fn factors_in_gross_follows_the_mode() {
    let current = CurrentStaffing {
        net_roles: RoleBreakdown::new(1.2, 1.0, 0.8),
        absence_fte: 1.4,
        productivity: 7.0,
    };
    let proportion = engine(ConversionMode::RoleProportion, 4.0);
    assert!(proportion.predict(&request(Segment::Shopping, current)).unwrap().factors_in_gross);

    let offset = engine(ConversionMode::AbsenceOffset, 4.0);
    let recorded = offset.predict(&request(Segment::Shopping, current)).unwrap();
    assert!(!recorded.factors_in_gross);
    assert_eq!(recorded.conversion.source, FactorSource::PharmacySpecific);

    let manual = StaffingRequest::new(70_000.0, 1_300_000.0, Some(Segment::Shopping), 0.55)
        .with_pharmacy(PHARMACY);
    let estimated = offset.predict(&manual).unwrap();
    assert!(estimated.factors_in_gross);
    let roles = offset.segments().profile(Some(Segment::Shopping)).role_proportions.scale(4.0);
    let expected = roles.total() + PAYROLL.expected_absence(&roles);
    assert!((estimated.predicted.total - expected).abs() < 1e-4);

    assert!(!offset.predict(&manual.with_absence(0.9)).unwrap().factors_in_gross);
}

/// No payroll row → segment default, and the segment default still applies to both sides.
#[test]
fn unknown_pharmacy_resolves_to_segment_default() {
    let e = engine(ConversionMode::RoleProportion, 4.0);
    let resolved = e.resolve_conversion_factors(Some(999), Some(Segment::Poliklinika));
    assert_eq!(resolved.source, FactorSource::SegmentDefault);
    assert_eq!(
        resolved.factors,
        e.segments().profile(Some(Segment::Poliklinika)).gross_factors
    );
}

/// An unrecognised segment without payroll data takes the network medians.
#[test]
fn unrecognised_segment_uses_network_medians() {
    let e = engine(ConversionMode::RoleProportion, 4.0);
    let resolved = e.resolve_conversion_factors(None, None);
    assert_eq!(resolved.source, FactorSource::NetworkMedian);
    assert_eq!(resolved.factors, ConversionFactors::new(1.2, 1.2, 1.2));
}

/// A payroll row below 1.0 is dropped at load.
#[test]
fn anomalous_payroll_rows_are_dropped() {
    let table = FactorTable::new(
        HashMap::from([(1, ConversionFactors::new(0.9, 1.2, 1.2)), (2, PAYROLL)]),
        None,
    )
    .unwrap();
    assert_eq!(table.len(), 1);
    assert!(table.get(1).is_none());
}

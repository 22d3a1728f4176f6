//! The per-pharmacy input record as read from the record store.

use crate::{
    error::{StaffingError, StaffingResult},
    features::FeatureColumn,
    types::{PharmacyId, RoleBreakdown},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmacyRecord {
    pub id:           PharmacyId,
    pub city:         String,
    #[serde(default)]
    pub region:       Option<String>,
    /// Segment label as stored; parsed by the engine.
    pub typ:          String,
    /// Annual transactions (till receipts).
    pub bloky:        f64,
    /// Annual revenue, EUR.
    pub trzby:        f64,
    /// Share of transactions that are prescriptions, 0–1.
    pub podiel_rx:    f64,
    /// Annual NET FTE per role.
    pub staff_net:    RoleBreakdown,
    /// Absence FTE from payroll (fte_n).
    pub absence_fte:  f64,
    /// Transactions per staff-hour.
    pub productivity: f64,
    /// Year-over-year change in transactions as a fraction, when known.
    #[serde(default)]
    pub bloky_trend:  Option<f64>,
    /// Measured model features (bloky_cv, kpi_mean, …) when the store has them.
    #[serde(default)]
    pub features:     BTreeMap<FeatureColumn, f64>,
}

impl PharmacyRecord {
    pub fn validate(&self) -> StaffingResult<()> {
        non_negative("bloky", self.bloky)?;
        non_negative("trzby", self.trzby)?;
        non_negative("absence_fte", self.absence_fte)?;
        non_negative("productivity", self.productivity)?;
        share("podiel_rx", self.podiel_rx)?;
        if let Some(trend) = self.bloky_trend {
            if !trend.is_finite() {
                return Err(StaffingError::InvalidInput { field: "bloky_trend", value: trend });
            }
        }
        for (field, value) in [
            ("staff_net.F", self.staff_net.pharmacist),
            ("staff_net.L", self.staff_net.assistant),
            ("staff_net.ZF", self.staff_net.deputy),
        ] {
            non_negative(field, value)?;
        }
        for value in self.features.values() {
            if !value.is_finite() {
                return Err(StaffingError::InvalidInput { field: "features", value: *value });
            }
        }
        Ok(())
    }

    pub fn actual_net(&self) -> f64 {
        self.staff_net.total()
    }
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> StaffingResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(StaffingError::InvalidInput { field, value })
    }
}

pub(crate) fn share(field: &'static str, value: f64) -> StaffingResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(StaffingError::InvalidInput { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PharmacyRecord {
        PharmacyRecord {
            id: 25,
            city: "Trnava".into(),
            region: Some("TT".into()),
            typ: "B - shopping".into(),
            bloky: 126_000.0,
            trzby: 2_500_000.0,
            podiel_rx: 0.5,
            staff_net: RoleBreakdown::new(2.0, 2.5, 0.8),
            absence_fte: 1.1,
            productivity: 9.8,
            bloky_trend: Some(0.04),
            features: BTreeMap::new(),
        }
    }

    #[test]
    fn valid_record_passes() {
        record().validate().unwrap();
        assert!((record().actual_net() - 5.3).abs() < 1e-9);
    }

    #[test]
    fn rx_share_outside_unit_interval_is_rejected() {
        let mut r = record();
        r.podiel_rx = 1.2;
        let err = r.validate().unwrap_err();
        assert!(matches!(err, StaffingError::InvalidInput { field: "podiel_rx", .. }), "{err}");
    }

    #[test]
    fn negative_staff_is_rejected() {
        let mut r = record();
        r.staff_net.deputy = -0.1;
        assert!(r.validate().is_err());
    }

    #[test]
    fn nan_revenue_is_rejected() {
        let mut r = record();
        r.trzby = f64::NAN;
        assert!(r.validate().is_err());
    }

    #[test]
    fn record_json_uses_payroll_codes_for_staff() {
        let json = r#"{"id": 7, "city": "Nitra", "typ": "D - street", "bloky": 40000,
            "trzby": 700000, "podiel_rx": 0.62, "staff_net": {"F": 1.4, "L": 0.0, "ZF": 0.9},
            "absence_fte": 0.4, "productivity": 6.1, "features": {"bloky_cv": 0.11}}"#;
        let r: PharmacyRecord = serde_json::from_str(json).unwrap();
        assert_eq!(r.staff_net.deputy, 0.9);
        assert_eq!(r.features[&FeatureColumn::BlokyCv], 0.11);
        assert!(r.region.is_none());
        assert!(r.bloky_trend.is_none());
    }

    #[test]
    fn infinite_trend_is_rejected() {
        let mut r = record();
        r.bloky_trend = Some(f64::INFINITY);
        let err = r.validate().unwrap_err();
        assert!(matches!(err, StaffingError::InvalidInput { field: "bloky_trend", .. }), "{err}");
    }
}

//! Gap triage: turn an FTE gap into a status and an action priority,
//! and roll a batch of predictions up into a network summary.

use crate::{engine::StaffingPrediction, types::{round_to, RoleBreakdown}};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Summary key for predictions that carry no cohort (manual, unparsed label).
pub const UNRECOGNISED_COHORT: &str = "unrecognised";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapThresholds {
    /// |gap| above this counts as under/overstaffed (~1.5 hrs/week).
    pub notable:  f64,
    /// Understaffed and above average beyond this → urgent.
    pub urgent:   f64,
    /// Overstaffed beyond this → optimise (reallocate).
    pub optimize: f64,
    /// |gap| above this is a network outlier.
    pub outlier:  f64,
    /// Year-over-year transaction growth above this → monitor.
    pub monitor:  f64,
    /// NET FTE at or below this, with no assistants, is a small pharmacy.
    pub small_pharmacy_net_fte: f64,
    /// |total gap| below this many GROSS FTE keeps a network or segment balanced.
    pub network_balance_fte: f64,
}

impl Default for GapThresholds {
    fn default() -> Self {
        Self {
            notable:  0.05,
            urgent:   0.05,
            optimize: 0.2,
            outlier:  1.0,
            monitor:  0.15,
            small_pharmacy_net_fte: 2.5,
            network_balance_fte: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffingStatus {
    Understaffed,
    #[default]
    Balanced,
    Overstaffed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPriority {
    /// Understaffed while above-average: revenue is being lost.
    Urgent,
    /// Overstaffed: headcount can move elsewhere.
    Optimize,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapTriage {
    pub status:     StaffingStatus,
    pub priority:   ActionPriority,
    pub is_outlier: bool,
    /// Growing fast enough to watch for future staffing needs. Independent
    /// of the priority: an urgent pharmacy can also be growing.
    pub is_growing: bool,
}

impl GapThresholds {
    pub fn classify(&self, gap: f64, is_above_average: bool, bloky_trend: Option<f64>) -> GapTriage {
        let status = if gap > self.notable {
            StaffingStatus::Understaffed
        } else if gap < -self.notable {
            StaffingStatus::Overstaffed
        } else {
            StaffingStatus::Balanced
        };
        let priority = if gap > self.urgent && is_above_average {
            ActionPriority::Urgent
        } else if gap < -self.optimize {
            ActionPriority::Optimize
        } else {
            ActionPriority::None
        };
        GapTriage {
            status,
            priority,
            is_outlier: gap.abs() > self.outlier,
            is_growing: bloky_trend.map_or(false, |t| t > self.monitor),
        }
    }

    /// Small pharmacies without assistants legitimately run lean, so their
    /// revenue at risk may be a false positive.
    pub fn is_small_pharmacy(&self, net_roles: &RoleBreakdown) -> bool {
        net_roles.total() <= self.small_pharmacy_net_fte && net_roles.assistant == 0.0
    }

    /// Status of an aggregate gap (network or segment total).
    pub fn aggregate_status(&self, total_gap: f64) -> StaffingStatus {
        if total_gap.abs() < self.network_balance_fte {
            StaffingStatus::Balanced
        } else if total_gap > 0.0 {
            StaffingStatus::Understaffed
        } else {
            StaffingStatus::Overstaffed
        }
    }
}

/// Gap relative to actual GROSS, in percent to one decimal. 0 without staff.
fn diff_pct(total_gap: f64, total_actual: f64) -> f64 {
    if total_actual > 0.0 {
        round_to(total_gap / total_actual * 100.0, 1)
    } else {
        0.0
    }
}

/// GROSS totals and status counts, shared by the network and each segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaffingTotals {
    pub pharmacies:      usize,
    pub understaffed:    usize,
    pub balanced:        usize,
    pub overstaffed:     usize,
    /// Σ actual GROSS over pharmacies with current staffing.
    pub total_actual:    f64,
    /// Σ predicted GROSS over the same pharmacies.
    pub total_predicted: f64,
    /// total_predicted − total_actual.
    pub total_gap:       f64,
    pub diff_pct:        f64,
    pub status:          StaffingStatus,
    pub revenue_at_risk: u64,
}

impl StaffingTotals {
    fn add(&mut self, p: &StaffingPrediction) {
        self.pharmacies += 1;
        if let Some(triage) = &p.triage {
            match triage.status {
                StaffingStatus::Understaffed => self.understaffed += 1,
                StaffingStatus::Balanced     => self.balanced += 1,
                StaffingStatus::Overstaffed  => self.overstaffed += 1,
            }
        }
        if let Some(actual) = &p.actual {
            self.total_actual += actual.total;
            self.total_predicted += p.predicted.total;
        }
        self.revenue_at_risk += p.revenue_at_risk;
    }

    fn finish(&mut self, thresholds: &GapThresholds) {
        self.total_gap = self.total_predicted - self.total_actual;
        self.diff_pct = diff_pct(self.total_gap, self.total_actual);
        self.status = thresholds.aggregate_status(self.total_gap);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    #[serde(flatten)]
    pub totals:           StaffingTotals,
    pub urgent:           usize,
    pub optimize:         usize,
    pub monitor:          usize,
    pub outliers:         usize,
    pub small_pharmacies: usize,
    /// Keyed by cohort label: the canonical segment label, or the raw
    /// `typ` for records whose label did not parse.
    pub by_segment:       BTreeMap<String, StaffingTotals>,
}

impl NetworkSummary {
    pub fn from_predictions<'a>(
        predictions: impl IntoIterator<Item = &'a StaffingPrediction>,
        thresholds: &GapThresholds,
    ) -> Self {
        let mut summary = NetworkSummary::default();
        for p in predictions {
            summary.totals.add(p);
            if let Some(triage) = &p.triage {
                match triage.priority {
                    ActionPriority::Urgent   => summary.urgent += 1,
                    ActionPriority::Optimize => summary.optimize += 1,
                    ActionPriority::None     => {}
                }
                if triage.is_outlier {
                    summary.outliers += 1;
                }
                if triage.is_growing {
                    summary.monitor += 1;
                }
            }
            if p.is_small_pharmacy {
                summary.small_pharmacies += 1;
            }
            let label = p.cohort.as_ref().map_or(UNRECOGNISED_COHORT, |c| c.as_str());
            summary.by_segment.entry(label.to_string()).or_default().add(p);
        }
        summary.totals.finish(thresholds);
        for seg in summary.by_segment.values_mut() {
            seg.finish(thresholds);
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_uses_notable_band() {
        let t = GapThresholds::default();
        assert_eq!(t.classify(0.3, false, None).status, StaffingStatus::Understaffed);
        assert_eq!(t.classify(0.04, false, None).status, StaffingStatus::Balanced);
        assert_eq!(t.classify(-0.04, false, None).status, StaffingStatus::Balanced);
        assert_eq!(t.classify(-0.3, false, None).status, StaffingStatus::Overstaffed);
    }

    #[test]
    fn urgent_needs_above_average_productivity() {
        let t = GapThresholds::default();
        assert_eq!(t.classify(0.5, true, None).priority, ActionPriority::Urgent);
        assert_eq!(t.classify(0.5, false, None).priority, ActionPriority::None);
    }

    #[test]
    fn optimize_only_beyond_its_threshold() {
        let t = GapThresholds::default();
        assert_eq!(t.classify(-0.1, true, None).priority, ActionPriority::None);
        assert_eq!(t.classify(-0.25, true, None).priority, ActionPriority::Optimize);
        assert!(t.classify(-1.5, false, None).is_outlier);
        assert!(!t.classify(0.9, false, None).is_outlier);
    }

    #[test]
    fn growth_above_fifteen_percent_is_monitored() {
        let t = GapThresholds::default();
        assert!(t.classify(0.0, false, Some(0.2)).is_growing);
        assert!(!t.classify(0.0, false, Some(0.15)).is_growing);
        assert!(!t.classify(0.0, false, Some(-0.3)).is_growing);
        assert!(!t.classify(0.0, false, None).is_growing);

        let both = t.classify(0.5, true, Some(0.4));
        assert_eq!(both.priority, ActionPriority::Urgent);
        assert!(both.is_growing);
    }

    #[test]
    fn small_pharmacy_requires_no_assistants() {
        let t = GapThresholds::default();
        assert!(t.is_small_pharmacy(&RoleBreakdown::new(1.5, 0.0, 1.0)));
        assert!(!t.is_small_pharmacy(&RoleBreakdown::new(1.5, 0.5, 0.5)));
        assert!(!t.is_small_pharmacy(&RoleBreakdown::new(2.0, 0.0, 1.0)));
    }

    #[test]
    fn aggregate_gap_under_ten_fte_is_balanced() {
        let t = GapThresholds::default();
        assert_eq!(t.aggregate_status(9.9), StaffingStatus::Balanced);
        assert_eq!(t.aggregate_status(-9.9), StaffingStatus::Balanced);
        assert_eq!(t.aggregate_status(10.0), StaffingStatus::Understaffed);
        assert_eq!(t.aggregate_status(-12.0), StaffingStatus::Overstaffed);
    }

    #[test]
    fn diff_pct_is_zero_without_actual_staff() {
        assert_eq!(diff_pct(3.0, 0.0), 0.0);
        assert_eq!(diff_pct(5.0, 200.0), 2.5);
    }

    #[test]
    fn partial_thresholds_fill_from_defaults() {
        let t: GapThresholds = serde_json::from_str(r#"{"monitor": 0.25}"#).unwrap();
        assert_eq!(t.monitor, 0.25);
        assert_eq!(t.optimize, 0.2);
        assert_eq!(t.network_balance_fte, 10.0);
    }
}

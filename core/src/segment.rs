//! Segment constants: the closed set of pharmacy location archetypes
//! and the per-segment profile table.
//!
//! RULE: Nothing outside this module matches on a segment label string.
//! Labels are parsed once into `Segment`; every lookup goes through
//! `SegmentTable`, which always answers (unknown → fallback profile).

use crate::{
    error::{StaffingError, StaffingResult},
    gross::ConversionFactors,
    types::RoleBreakdown,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Proportions must sum to 1 within this tolerance.
pub const PROPORTION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    #[serde(rename = "A - shopping premium")]
    ShoppingPremium,
    #[serde(rename = "B - shopping")]
    Shopping,
    #[serde(rename = "C - street +")]
    StreetPlus,
    #[serde(rename = "D - street")]
    Street,
    #[serde(rename = "E - poliklinika")]
    Poliklinika,
}

impl Segment {
    pub const ALL: [Segment; 5] = [
        Segment::ShoppingPremium,
        Segment::Shopping,
        Segment::StreetPlus,
        Segment::Street,
        Segment::Poliklinika,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Segment::ShoppingPremium => "A - shopping premium",
            Segment::Shopping        => "B - shopping",
            Segment::StreetPlus      => "C - street +",
            Segment::Street          => "D - street",
            Segment::Poliklinika     => "E - poliklinika",
        }
    }

    /// Parse a record-store label. Surrounding whitespace is ignored.
    pub fn from_label(label: &str) -> Option<Segment> {
        let label = label.trim();
        Segment::ALL.into_iter().find(|s| s.label() == label)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Segment {
    type Err = StaffingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Segment::from_label(s).ok_or_else(|| StaffingError::UnknownSegment { label: s.to_string() })
    }
}

/// Static per-segment constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentProfile {
    /// Share of NET FTE per role. Sums to 1.
    pub role_proportions:    RoleBreakdown,
    /// Default NET → GROSS multipliers when no payroll factors exist.
    pub gross_factors:       ConversionFactors,
    /// Mean transactions per staff-hour across the segment.
    pub mean_productivity:   f64,
    /// Share of annual revenue taken in peak hours.
    pub peak_revenue_share:  f64,
    /// How much sharper overload is in peak hours than on average.
    pub peak_overload_ratio: f64,
    /// Substitutability of nearby competitors (1.0 = loyal neighbourhood).
    pub competition_factor:  f64,
}

impl SegmentProfile {
    fn validate(&self, name: &str) -> StaffingResult<()> {
        let p = &self.role_proportions;
        if !p.is_non_negative() {
            return Err(StaffingError::config(format!(
                "{name}: role proportions must be non-negative, got {p:?}"
            )));
        }
        let sum = p.total();
        if (sum - 1.0).abs() > PROPORTION_TOLERANCE {
            return Err(StaffingError::config(format!(
                "{name}: role proportions sum to {sum:.6}, expected 1.0"
            )));
        }
        self.gross_factors.validate().map_err(|reason| {
            StaffingError::config(format!("{name}: {reason}"))
        })?;
        if !(self.mean_productivity.is_finite() && self.mean_productivity >= 0.0) {
            return Err(StaffingError::config(format!(
                "{name}: mean productivity must be >= 0, got {}",
                self.mean_productivity
            )));
        }
        if !(self.peak_revenue_share > 0.0 && self.peak_revenue_share <= 1.0) {
            return Err(StaffingError::config(format!(
                "{name}: peak revenue share must be in (0, 1], got {}",
                self.peak_revenue_share
            )));
        }
        if !(self.peak_overload_ratio.is_finite() && self.peak_overload_ratio > 0.0) {
            return Err(StaffingError::config(format!(
                "{name}: peak overload ratio must be > 0, got {}",
                self.peak_overload_ratio
            )));
        }
        if !(self.competition_factor.is_finite() && self.competition_factor >= 1.0) {
            return Err(StaffingError::config(format!(
                "{name}: competition factor must be >= 1.0, got {}",
                self.competition_factor
            )));
        }
        Ok(())
    }
}

/// On-disk entry: the segment key next to its profile fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentProfileEntry {
    pub segment: Segment,
    #[serde(flatten)]
    pub profile: SegmentProfile,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SegmentProfilesFile {
    pub segments: Vec<SegmentProfileEntry>,
    pub fallback: SegmentProfile,
}

/// Read-only lookup from segment to profile. Complete over all five
/// segments; the fallback answers for labels that did not parse.
#[derive(Debug, Clone)]
pub struct SegmentTable {
    profiles: HashMap<Segment, SegmentProfile>,
    fallback: SegmentProfile,
}

impl SegmentTable {
    /// Build and validate. Every segment must appear exactly once.
    pub fn new(entries: Vec<SegmentProfileEntry>, fallback: SegmentProfile) -> StaffingResult<Self> {
        let mut profiles = HashMap::new();
        for entry in entries {
            if profiles.insert(entry.segment, entry.profile).is_some() {
                return Err(StaffingError::config(format!(
                    "segment '{}' listed more than once",
                    entry.segment
                )));
            }
        }
        let table = Self { profiles, fallback };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> StaffingResult<()> {
        for segment in Segment::ALL {
            let profile = self.profiles.get(&segment).ok_or_else(|| {
                StaffingError::config(format!("segment '{segment}' missing from profile table"))
            })?;
            profile.validate(segment.label())?;
        }
        self.fallback.validate("fallback")
    }

    /// Profile for a parsed segment, or the fallback for `None`.
    pub fn profile(&self, segment: Option<Segment>) -> &SegmentProfile {
        segment
            .and_then(|s| self.profiles.get(&s))
            .unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &SegmentProfile {
        &self.fallback
    }

    /// Parse a label, logging when it falls back.
    pub fn resolve_label(&self, label: &str) -> Option<Segment> {
        let segment = Segment::from_label(label);
        if segment.is_none() {
            log::warn!("segment: unrecognised label '{label}', using fallback profile");
        }
        segment
    }

    /// Replace segment means (model packages carry the means they were fit against).
    pub fn override_mean_productivity(&mut self, means: &HashMap<Segment, f64>) -> StaffingResult<()> {
        for (segment, mean) in means {
            if let Some(profile) = self.profiles.get_mut(segment) {
                profile.mean_productivity = *mean;
            }
        }
        self.validate()
    }

    /// Built-in constants, identical to `data/segments/segment_profiles.json`.
    pub fn builtin() -> Self {
        let entry = |segment, props: [f64; 3], factors: [f64; 3], mean, share, comp| SegmentProfileEntry {
            segment,
            profile: SegmentProfile {
                role_proportions:    RoleBreakdown::new(props[0], props[1], props[2]),
                gross_factors:       ConversionFactors::new(factors[0], factors[1], factors[2]),
                mean_productivity:   mean,
                peak_revenue_share:  share,
                peak_overload_ratio: 2.5,
                competition_factor:  comp,
            },
        };
        let profiles = vec![
            entry(Segment::ShoppingPremium, [0.3938, 0.5078, 0.0984], [1.17, 1.22, 1.23], 7.25, 0.60, 1.3),
            entry(Segment::Shopping,        [0.3845, 0.4573, 0.1582], [1.22, 1.22, 1.18], 9.14, 0.57, 1.2),
            entry(Segment::StreetPlus,      [0.3577, 0.3654, 0.2769], [1.23, 1.22, 1.20], 6.85, 0.52, 1.1),
            entry(Segment::Street,          [0.3067, 0.3815, 0.3118], [1.29, 1.22, 1.25], 6.44, 0.50, 1.0),
            entry(Segment::Poliklinika,     [0.4410, 0.3492, 0.2098], [1.27, 1.24, 1.23], 6.11, 0.55, 1.2),
        ];
        let fallback = SegmentProfile {
            role_proportions:    RoleBreakdown::new(0.4, 0.4, 0.2),
            gross_factors:       ConversionFactors::new(1.21, 1.22, 1.20),
            mean_productivity:   7.0,
            peak_revenue_share:  0.50,
            peak_overload_ratio: 4.0,
            competition_factor:  1.0,
        };
        Self {
            profiles: profiles.into_iter().map(|e| (e.segment, e.profile)).collect(),
            fallback,
        }
    }
}

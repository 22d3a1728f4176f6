//! Productivity indexing: raw transactions per staff-hour relative to the
//! segment mean (100 = segment average), plus rank within the segment cohort.
//!
//! `is_above_average` compares raw against the mean directly. The index is
//! clamped for display and must not be used for classification.

use crate::segment::Segment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const INDEX_MIN: u32 = 50;
pub const INDEX_MAX: u32 = 150;
pub const INDEX_NEUTRAL: u32 = 100;

/// Display band thresholds on the index.
pub const BAND_ABOVE: u32 = 105;
pub const BAND_BELOW: u32 = 95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductivityBand {
    Above,
    Average,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProductivityIndex {
    pub raw:              f64,
    pub segment_mean:     f64,
    /// round(raw / mean × 100), clamped to [50, 150].
    pub index:            u32,
    pub is_above_average: bool,
    pub band:             ProductivityBand,
}

impl ProductivityIndex {
    /// raw / mean, or None without a usable mean.
    pub fn ratio(&self) -> Option<f64> {
        (self.segment_mean > 0.0).then(|| self.raw / self.segment_mean)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProductivityIndexer;

impl ProductivityIndexer {
    pub fn new() -> Self {
        Self
    }

    pub fn index(&self, raw: f64, segment_mean: f64) -> ProductivityIndex {
        // A zero mean carries no signal: neutral index, never above average.
        let (index, is_above_average) = if segment_mean > 0.0 && raw.is_finite() {
            let scaled = (raw / segment_mean * 100.0).round();
            let index = scaled.clamp(INDEX_MIN as f64, INDEX_MAX as f64) as u32;
            (index, raw > segment_mean)
        } else {
            (INDEX_NEUTRAL, false)
        };
        let band = if index > BAND_ABOVE {
            ProductivityBand::Above
        } else if index < BAND_BELOW {
            ProductivityBand::Below
        } else {
            ProductivityBand::Average
        };
        ProductivityIndex { raw, segment_mean, index, is_above_average, band }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortRank {
    /// 0–100, ascending "min" rank over cohort size.
    pub percentile:  u32,
    /// 1 = most productive; ties share the best rank.
    pub peer_rank:   usize,
    pub cohort_size: usize,
}

impl CohortRank {
    pub fn peer_rank_label(&self) -> String {
        format!("{}/{}", self.peer_rank, self.cohort_size)
    }
}

/// Which cohort a pharmacy is compared within. Parsed segments share their
/// canonical label; unparsed labels each form their own cohort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CohortKey(String);

impl CohortKey {
    pub fn from_label(label: &str) -> Self {
        match Segment::from_label(label) {
            Some(segment) => Self::from(segment),
            None          => Self(label.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Segment> for CohortKey {
    fn from(segment: Segment) -> Self {
        Self(segment.label().to_string())
    }
}

/// Raw productivity values grouped by cohort. Built once per batch.
#[derive(Debug, Clone, Default)]
pub struct ProductivityCohorts {
    by_cohort: HashMap<CohortKey, Vec<f64>>,
}

impl ProductivityCohorts {
    pub fn from_values(values: impl IntoIterator<Item = (CohortKey, f64)>) -> Self {
        let mut by_cohort: HashMap<CohortKey, Vec<f64>> = HashMap::new();
        for (key, raw) in values {
            if raw.is_finite() {
                by_cohort.entry(key).or_default().push(raw);
            }
        }
        Self { by_cohort }
    }

    pub fn cohort_size(&self, key: &CohortKey) -> usize {
        self.by_cohort.get(key).map_or(0, Vec::len)
    }

    /// Rank `raw` within its cohort. A value not already in the cohort is
    /// ranked as if it were added to it.
    pub fn rank(&self, key: &CohortKey, raw: f64) -> Option<CohortRank> {
        if !raw.is_finite() {
            return None;
        }
        let cohort = self.by_cohort.get(key)?;
        let member = cohort.iter().any(|v| *v == raw);
        let cohort_size = cohort.len() + usize::from(!member);
        let below = cohort.iter().filter(|v| **v < raw).count();
        let above = cohort.iter().filter(|v| **v > raw).count();
        let min_rank = below + 1;
        let percentile = (min_rank as f64 / cohort_size as f64 * 100.0).round() as u32;
        Some(CohortRank { percentile, peer_rank: above + 1, cohort_size })
    }
}

/// Transactions and revenue relative to the cohort mean. 100 = cohort average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeIndex {
    pub bloky_index: u32,
    pub trzby_index: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct VolumeTotals {
    bloky: f64,
    trzby: f64,
    count: usize,
}

/// Per-cohort mean transactions and revenue.
#[derive(Debug, Clone, Default)]
pub struct VolumeCohorts {
    by_cohort: HashMap<CohortKey, VolumeTotals>,
}

impl VolumeCohorts {
    pub fn from_values(values: impl IntoIterator<Item = (CohortKey, f64, f64)>) -> Self {
        let mut by_cohort: HashMap<CohortKey, VolumeTotals> = HashMap::new();
        for (key, bloky, trzby) in values {
            if bloky.is_finite() && trzby.is_finite() {
                let totals = by_cohort.entry(key).or_default();
                totals.bloky += bloky;
                totals.trzby += trzby;
                totals.count += 1;
            }
        }
        Self { by_cohort }
    }

    pub fn index(&self, key: &CohortKey, bloky: f64, trzby: f64) -> Option<VolumeIndex> {
        let totals = self.by_cohort.get(key)?;
        let n = totals.count as f64;
        Some(VolumeIndex {
            bloky_index: relative_index(bloky, totals.bloky / n),
            trzby_index: relative_index(trzby, totals.trzby / n),
        })
    }
}

/// A zero mean carries no signal and reads as average.
fn relative_index(value: f64, mean: f64) -> u32 {
    if mean > 0.0 && value.is_finite() {
        (value / mean * 100.0).round().max(0.0) as u32
    } else {
        INDEX_NEUTRAL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_is_relative_to_segment_mean() {
        let idx = ProductivityIndexer::new().index(10.0, 8.0);
        assert_eq!(idx.index, 125);
        assert!(idx.is_above_average);
        assert_eq!(idx.band, ProductivityBand::Above);
        assert_eq!(idx.ratio(), Some(1.25));
    }

    #[test]
    fn clamp_does_not_change_classification() {
        let indexer = ProductivityIndexer::new();
        let high = indexer.index(95.0, 9.14);
        assert_eq!(high.index, INDEX_MAX);
        assert!(high.is_above_average);

        let low = indexer.index(0.5, 9.14);
        assert_eq!(low.index, INDEX_MIN);
        assert!(!low.is_above_average);
    }

    #[test]
    fn raw_just_above_mean_is_above_average_at_index_100() {
        let idx = ProductivityIndexer::new().index(8.001, 8.0);
        assert_eq!(idx.index, 100);
        assert!(idx.is_above_average);
        assert_eq!(idx.band, ProductivityBand::Average);
    }

    #[test]
    fn zero_mean_is_neutral() {
        let idx = ProductivityIndexer::new().index(7.0, 0.0);
        assert_eq!(idx.index, INDEX_NEUTRAL);
        assert!(!idx.is_above_average);
        assert_eq!(idx.ratio(), None);
    }

    #[test]
    fn ties_share_lowest_rank() {
        let street = CohortKey::from(Segment::Street);
        let cohorts = ProductivityCohorts::from_values(
            [5.0, 7.0, 7.0, 9.0].map(|v| (street.clone(), v)),
        );
        let tied = cohorts.rank(&street, 7.0).unwrap();
        assert_eq!(tied.percentile, 50);
        assert_eq!(tied.peer_rank, 2);
        assert_eq!(tied.cohort_size, 4);
        assert_eq!(tied.peer_rank_label(), "2/4");

        let top = cohorts.rank(&street, 9.0).unwrap();
        assert_eq!(top.percentile, 100);
        assert_eq!(top.peer_rank, 1);
    }

    #[test]
    fn outsider_is_ranked_as_added() {
        let cohorts = ProductivityCohorts::from_values([(CohortKey::from(Segment::Shopping), 6.0)]);
        let rank = cohorts.rank(&CohortKey::from(Segment::Shopping), 8.0).unwrap();
        assert_eq!(rank.cohort_size, 2);
        assert_eq!(rank.percentile, 100);
        assert!(cohorts.rank(&CohortKey::from(Segment::Street), 8.0).is_none());
    }

    #[test]
    fn unparsed_labels_form_separate_cohorts() {
        let kiosk = CohortKey::from_label("X - kiosk");
        let airport = CohortKey::from_label(" Y - airport ");
        assert_ne!(kiosk, airport);
        assert_eq!(airport.as_str(), "Y - airport");
        assert_eq!(CohortKey::from_label(" B - shopping"), CohortKey::from(Segment::Shopping));

        let cohorts = ProductivityCohorts::from_values([(kiosk.clone(), 5.0), (airport.clone(), 9.0)]);
        assert_eq!(cohorts.rank(&kiosk, 5.0).unwrap().peer_rank_label(), "1/1");
        assert_eq!(cohorts.rank(&airport, 9.0).unwrap().peer_rank_label(), "1/1");
    }

    #[test]
    fn volume_index_is_relative_to_cohort_mean() {
        let street = CohortKey::from(Segment::Street);
        let volumes = VolumeCohorts::from_values([
            (street.clone(), 40_000.0, 600_000.0),
            (street.clone(), 60_000.0, 1_400_000.0),
        ]);
        let idx = volumes.index(&street, 60_000.0, 1_400_000.0).unwrap();
        assert_eq!(idx, VolumeIndex { bloky_index: 120, trzby_index: 140 });
        assert!(volumes.index(&CohortKey::from(Segment::Shopping), 1.0, 1.0).is_none());
    }

    #[test]
    fn zero_volume_cohort_reads_as_average() {
        let key = CohortKey::from_label("E - poliklinika");
        let volumes = VolumeCohorts::from_values([(key.clone(), 0.0, 0.0)]);
        let idx = volumes.index(&key, 0.0, 0.0).unwrap();
        assert_eq!((idx.bloky_index, idx.trzby_index), (INDEX_NEUTRAL, INDEX_NEUTRAL));
    }
}

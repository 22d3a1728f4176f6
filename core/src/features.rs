//! Feature derivation: raw pharmacy inputs to the model's feature vector.
//!
//! Column order is part of the model contract (see `FeatureColumn::ALL`).
//! The productivity residual is asymmetric: above-average efficiency is
//! credited, below-average is clipped to zero and never adds headcount.

use crate::{error::StaffingError, segment::Segment};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

pub const RX_TIME_FACTOR: f64 = 0.41;
pub const FALLBACK_REVENUE_PER_TRANSACTION: f64 = 20.0;
pub const BASE_VARIABILITY: f64 = 0.028;
pub const PROD_RESIDUAL_SCALE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureColumn {
    EffectiveBloky,
    Trzby,
    RevenuePerTransaction,
    PodielRx,
    BlokyRange,
    TrzbyCv,
    BlokyCv,
    KpiMean,
    SeasonalPeakFactor,
    ProdResidual,
}

impl FeatureColumn {
    /// Stable model column order.
    pub const ALL: [FeatureColumn; 10] = [
        FeatureColumn::EffectiveBloky,
        FeatureColumn::Trzby,
        FeatureColumn::RevenuePerTransaction,
        FeatureColumn::PodielRx,
        FeatureColumn::BlokyRange,
        FeatureColumn::TrzbyCv,
        FeatureColumn::BlokyCv,
        FeatureColumn::KpiMean,
        FeatureColumn::SeasonalPeakFactor,
        FeatureColumn::ProdResidual,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeatureColumn::EffectiveBloky        => "effective_bloky",
            FeatureColumn::Trzby                 => "trzby",
            FeatureColumn::RevenuePerTransaction => "revenue_per_transaction",
            FeatureColumn::PodielRx              => "podiel_rx",
            FeatureColumn::BlokyRange            => "bloky_range",
            FeatureColumn::TrzbyCv               => "trzby_cv",
            FeatureColumn::BlokyCv               => "bloky_cv",
            FeatureColumn::KpiMean               => "kpi_mean",
            FeatureColumn::SeasonalPeakFactor    => "seasonal_peak_factor",
            FeatureColumn::ProdResidual          => "prod_residual",
        }
    }
}

impl FromStr for FeatureColumn {
    type Err = StaffingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeatureColumn::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| StaffingError::config(format!("unknown feature column '{s}'")))
    }
}

/// The model input: one value per column plus the categorical segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub values:  [f64; FeatureColumn::COUNT],
    pub segment: Option<Segment>,
}

impl FeatureVector {
    pub fn get(&self, column: FeatureColumn) -> f64 {
        self.values[column.index()]
    }

    fn set(&mut self, column: FeatureColumn, value: f64) {
        self.values[column.index()] = value;
    }
}

/// Derivation constants. The model package may override the Rx factor
/// and supplies the defaults (training medians).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSettings {
    #[serde(default = "default_rx_time_factor")]
    pub rx_time_factor: f64,
    #[serde(default = "default_base_variability")]
    pub base_variability: f64,
    #[serde(default = "default_prod_residual_scale")]
    pub prod_residual_scale: f64,
    #[serde(default = "default_fallback_rpt")]
    pub fallback_revenue_per_transaction: f64,
    #[serde(default)]
    pub defaults: HashMap<FeatureColumn, f64>,
}

fn default_rx_time_factor() -> f64 { RX_TIME_FACTOR }
fn default_base_variability() -> f64 { BASE_VARIABILITY }
fn default_prod_residual_scale() -> f64 { PROD_RESIDUAL_SCALE }
fn default_fallback_rpt() -> f64 { FALLBACK_REVENUE_PER_TRANSACTION }

impl Default for FeatureSettings {
    fn default() -> Self {
        Self {
            rx_time_factor: RX_TIME_FACTOR,
            base_variability: BASE_VARIABILITY,
            prod_residual_scale: PROD_RESIDUAL_SCALE,
            fallback_revenue_per_transaction: FALLBACK_REVENUE_PER_TRANSACTION,
            defaults: HashMap::new(),
        }
    }
}

/// Where the productivity residual comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProductivitySignal {
    /// Manual input: z-score in −1..1, scaled by `prod_residual_scale`.
    ZScore(f64),
    /// Record input: raw productivity minus segment mean.
    Residual(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureInputs {
    pub bloky:         f64,
    pub trzby:         f64,
    pub segment:       Option<Segment>,
    pub podiel_rx:     f64,
    pub productivity:  ProductivitySignal,
    pub variability_z: f64,
    /// Explicit values for non-derived columns (and derived ones a record
    /// already carries, e.g. a measured bloky_range).
    pub overrides:     BTreeMap<FeatureColumn, f64>,
}

impl FeatureInputs {
    pub fn manual(bloky: f64, trzby: f64, segment: Option<Segment>, podiel_rx: f64) -> Self {
        Self {
            bloky,
            trzby,
            segment,
            podiel_rx,
            productivity: ProductivitySignal::ZScore(0.0),
            variability_z: 0.0,
            overrides: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    settings: FeatureSettings,
}

impl FeatureBuilder {
    pub fn new(settings: FeatureSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FeatureSettings {
        &self.settings
    }

    pub fn effective_bloky(&self, bloky: f64, podiel_rx: f64) -> f64 {
        bloky * (1.0 + self.settings.rx_time_factor * podiel_rx)
    }

    pub fn revenue_per_transaction(&self, trzby: f64, bloky: f64) -> f64 {
        if bloky > 0.0 {
            trzby / bloky
        } else {
            self.settings.fallback_revenue_per_transaction
        }
    }

    pub fn prod_residual(&self, signal: ProductivitySignal) -> f64 {
        let raw = match signal {
            ProductivitySignal::ZScore(z)   => z * self.settings.prod_residual_scale,
            ProductivitySignal::Residual(r) => r,
        };
        // Clip, never penalise. NaN also lands on 0.
        raw.max(0.0)
    }

    /// Total over non-negative inputs: never fails, `bloky == 0` included.
    pub fn build(&self, inputs: &FeatureInputs) -> FeatureVector {
        let mut vector = FeatureVector { values: [0.0; FeatureColumn::COUNT], segment: inputs.segment };

        for (column, value) in &self.settings.defaults {
            vector.set(*column, *value);
        }
        for (column, value) in &inputs.overrides {
            vector.set(*column, *value);
        }

        if !inputs.overrides.contains_key(&FeatureColumn::RevenuePerTransaction) {
            vector.set(
                FeatureColumn::RevenuePerTransaction,
                self.revenue_per_transaction(inputs.trzby, inputs.bloky),
            );
        }
        if !inputs.overrides.contains_key(&FeatureColumn::BlokyRange) {
            vector.set(
                FeatureColumn::BlokyRange,
                inputs.bloky * self.settings.base_variability * (1.0 + inputs.variability_z),
            );
        }

        vector.set(FeatureColumn::EffectiveBloky, self.effective_bloky(inputs.bloky, inputs.podiel_rx));
        vector.set(FeatureColumn::Trzby, inputs.trzby);
        vector.set(FeatureColumn::PodielRx, inputs.podiel_rx);
        vector.set(FeatureColumn::ProdResidual, self.prod_residual(inputs.productivity));
        vector
    }
}

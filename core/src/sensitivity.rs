//! What-if deltas: how predicted GROSS FTE moves when one input moves.

use crate::{
    engine::{StaffingEngine, StaffingRequest},
    error::StaffingResult,
    segment::Segment,
    types::round_to,
};
use serde::{Deserialize, Serialize};

pub const VOLUME_STEP: f64 = 0.10;
pub const RX_STEP: f64 = 0.10;
const DELTA_DECIMALS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sensitivity {
    /// Predicted GROSS FTE at the unperturbed inputs.
    pub base_fte:    f64,
    pub bloky_10pct: f64,
    pub trzby_10pct: f64,
    /// Rx share +10 pp, capped at 1.0.
    pub rx_10pp:     f64,
}

/// Runs the manual-input pipeline with neutral productivity and variability.
pub struct SensitivityAnalyzer<'a> {
    engine: &'a StaffingEngine,
}

impl<'a> SensitivityAnalyzer<'a> {
    pub fn new(engine: &'a StaffingEngine) -> Self {
        Self { engine }
    }

    pub fn analyze(
        &self,
        bloky: f64,
        trzby: f64,
        podiel_rx: f64,
        segment: Option<Segment>,
    ) -> StaffingResult<Sensitivity> {
        let gross = |bloky: f64, trzby: f64, rx: f64| -> StaffingResult<f64> {
            let request = StaffingRequest::new(bloky, trzby, segment, rx);
            Ok(self.engine.predict(&request)?.predicted.total)
        };

        let base = gross(bloky, trzby, podiel_rx)?;
        let delta = |perturbed: f64| round_to(perturbed - base, DELTA_DECIMALS);

        let result = Sensitivity {
            base_fte:    round_to(base, DELTA_DECIMALS),
            bloky_10pct: delta(gross(bloky * (1.0 + VOLUME_STEP), trzby, podiel_rx)?),
            trzby_10pct: delta(gross(bloky, trzby * (1.0 + VOLUME_STEP), podiel_rx)?),
            rx_10pp:     delta(gross(bloky, trzby, (podiel_rx + RX_STEP).min(1.0))?),
        };
        log::debug!("sensitivity: {result:?}");
        Ok(result)
    }
}

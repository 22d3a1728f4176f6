//! NET FTE prediction: the model plus a staffing floor. Nothing else.

use crate::{features::FeatureVector, model::FteModel};
use std::sync::Arc;

/// Absolute minimum viable NET staffing, whatever the model says.
pub const MIN_NET_FTE: f64 = 0.5;

#[derive(Clone)]
pub struct NetFtePredictor {
    model: Arc<dyn FteModel>,
}

impl NetFtePredictor {
    pub fn new(model: Arc<dyn FteModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        // f64::max drops NaN, so a broken model output also floors.
        self.model.predict(features).max(MIN_NET_FTE)
    }
}

impl std::fmt::Debug for NetFtePredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetFtePredictor").field("model", &self.model.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureColumn;

    struct Fixed(f64);

    impl FteModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn predict(&self, _: &FeatureVector) -> f64 {
            self.0
        }
    }

    fn predict_with(output: f64) -> f64 {
        let features = FeatureVector { values: [0.0; FeatureColumn::COUNT], segment: None };
        NetFtePredictor::new(Arc::new(Fixed(output))).predict(&features)
    }

    #[test]
    fn output_above_floor_passes_through() {
        assert_eq!(predict_with(4.2), 4.2);
    }

    #[test]
    fn floor_applies_to_small_negative_and_nan() {
        assert_eq!(predict_with(0.1), MIN_NET_FTE);
        assert_eq!(predict_with(-3.0), MIN_NET_FTE);
        assert_eq!(predict_with(f64::NAN), MIN_NET_FTE);
    }
}

/// Per-target blend-shape (morph) weights of an entity.
///
/// Animation weight channels write here; the renderer reads [`weights`](Self::weights).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendShapeComponent {
    weights: Vec<f32>,
    pub target_names: Vec<String>,
}

impl BlendShapeComponent {
    #[must_use]
    pub fn new(target_count: usize) -> Self {
        Self {
            weights: vec![0.0; target_count],
            target_names: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.weights.len()
    }

    #[inline]
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Copies one weight per target. Extra values are ignored and missing
    /// targets keep their weight.
    pub fn set_weights(&mut self, weights: &[f32]) {
        if weights.len() != self.weights.len() {
            log::debug!(
                "Blend shape: got {} weights for {} targets",
                weights.len(),
                self.weights.len()
            );
        }
        let n = weights.len().min(self.weights.len());
        self.weights[..n].copy_from_slice(&weights[..n]);
    }

    pub fn set_weight(&mut self, target: usize, weight: f32) -> bool {
        match self.weights.get_mut(target) {
            Some(w) => {
                *w = weight;
                true
            }
            None => false,
        }
    }

    /// Weight of the target named `name`.
    #[must_use]
    pub fn weight_by_name(&self, name: &str) -> Option<f32> {
        let index = self.target_names.iter().position(|n| n == name)?;
        self.weights.get(index).copied()
    }
}

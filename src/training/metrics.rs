// Loss and accuracy over batches of class probabilities

use crate::emotion::argmax;
use ndarray::ArrayView2;

const EPSILON: f32 = 1e-7;

/// Mean categorical cross-entropy of `probabilities` against one-hot `targets`
pub fn categorical_crossentropy(
    probabilities: ArrayView2<f32>,
    targets: ArrayView2<f32>,
) -> f32 {
    let rows = probabilities.nrows();
    if rows == 0 {
        return 0.0;
    }

    let total: f32 = probabilities
        .outer_iter()
        .zip(targets.outer_iter())
        .map(|(p, t)| {
            p.iter()
                .zip(t.iter())
                .map(|(&p, &t)| -t * p.clamp(EPSILON, 1.0 - EPSILON).ln())
                .sum::<f32>()
        })
        .sum();
    total / rows as f32
}

/// Fraction of rows whose arg-max matches the target's arg-max
pub fn categorical_accuracy(probabilities: ArrayView2<f32>, targets: ArrayView2<f32>) -> f32 {
    let rows = probabilities.nrows();
    if rows == 0 {
        return 0.0;
    }

    let hits = probabilities
        .outer_iter()
        .zip(targets.outer_iter())
        .filter(|(p, t)| {
            let predicted = argmax(&p.to_vec());
            predicted.is_some() && predicted == argmax(&t.to_vec())
        })
        .count();
    hits as f32 / rows as f32
}

/// Sample-weighted running mean of a per-batch value
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningMean {
    total: f64,
    count: usize,
}

impl RunningMean {
    pub fn update(&mut self, value: f32, samples: usize) {
        self.total += value as f64 * samples as f64;
        self.count += samples;
    }

    pub fn mean(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            (self.total / self.count as f64) as f32
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn crossentropy_of_confident_correct_prediction_is_small() {
        let p = array![[0.9, 0.05, 0.05], [0.1, 0.8, 0.1]];
        let t = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let expected = -(0.9f32.ln() + 0.8f32.ln()) / 2.0;
        assert!((categorical_crossentropy(p.view(), t.view()) - expected).abs() < 1e-6);
    }

    #[test]
    fn crossentropy_clips_zero_probability() {
        let p = array![[0.0, 1.0]];
        let t = array![[1.0, 0.0]];
        let loss = categorical_crossentropy(p.view(), t.view());
        assert!(loss.is_finite());
        assert!((loss - (-(1e-7f32).ln())).abs() < 1e-3);
    }

    #[test]
    fn accuracy_counts_argmax_matches() {
        let p = array![[0.6, 0.4], [0.3, 0.7], [0.5, 0.5], [0.8, 0.2]];
        let t = array![[1.0, 0.0], [1.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        // ties resolve to index 0, so row 2 counts as correct
        assert_eq!(categorical_accuracy(p.view(), t.view()), 0.5);
    }

    #[test]
    fn running_mean_weights_by_samples() {
        let mut mean = RunningMean::default();
        mean.update(1.0, 32);
        mean.update(4.0, 16);
        assert!((mean.mean() - 2.0).abs() < 1e-6);
        assert_eq!(mean.count(), 48);
        assert_eq!(RunningMean::default().mean(), 0.0);
    }
}

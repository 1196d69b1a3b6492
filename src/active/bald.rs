//! BALD acquisition scores.
//!
//! Bayesian Active Learning by Disagreement scores a pool point by the
//! mutual information between its prediction and the model parameters,
//! estimated over Monte Carlo dropout passes:
//!
//! ```text
//! U(x) = H[ mean_t p_t(y|x) ] - mean_t H[ p_t(y|x) ]
//! ```
//!
//! The first term is the entropy of the averaged prediction, the second
//! the average per-pass entropy. Points every pass agrees on score zero;
//! points the passes are individually confident but mutually inconsistent
//! about score high. Entropies use log base 2.

/// Guard against log2(0) on saturated softmax outputs
const EPS: f32 = 1e-12;

/// Accumulator for Monte Carlo dropout passes over a fixed set of points.
///
/// Probabilities are row-major `[n, num_classes]` slices, one row per
/// point, as produced by a softmax forward pass.
#[derive(Debug, Clone)]
pub struct DropoutScores {
    sum_probs: Vec<f32>,
    sum_entropy: Vec<f32>,
    num_points: usize,
    num_classes: usize,
    passes: usize,
}

impl DropoutScores {
    /// Create an accumulator for `num_points` points
    pub fn new(num_points: usize, num_classes: usize) -> Self {
        Self {
            sum_probs: vec![0.0; num_points * num_classes],
            sum_entropy: vec![0.0; num_points],
            num_points,
            num_classes,
            passes: 0,
        }
    }

    /// Add one stochastic pass of probabilities
    pub fn add_pass(&mut self, probs: &[f32]) {
        assert_eq!(
            probs.len(),
            self.num_points * self.num_classes,
            "probability matrix shape mismatch"
        );

        for (sum, &p) in self.sum_probs.iter_mut().zip(probs.iter()) {
            *sum += p;
        }

        for (i, row) in probs.chunks(self.num_classes).enumerate() {
            self.sum_entropy[i] += entropy_bits(row);
        }

        self.passes += 1;
    }

    /// Final BALD scores, one per point
    pub fn bald(&self) -> Vec<f32> {
        assert!(self.passes > 0, "no dropout passes accumulated");
        let t = self.passes as f32;

        (0..self.num_points)
            .map(|i| {
                let row = &self.sum_probs[i * self.num_classes..(i + 1) * self.num_classes];
                let avg: Vec<f32> = row.iter().map(|&s| s / t).collect();

                let entropy_of_avg = entropy_bits(&avg);
                let avg_entropy = self.sum_entropy[i] / t;
                entropy_of_avg - avg_entropy
            })
            .collect()
    }
}

/// BALD scores from a list of per-pass probability matrices
pub fn bald_scores(passes: &[Vec<f32>], num_points: usize, num_classes: usize) -> Vec<f32> {
    let mut scores = DropoutScores::new(num_points, num_classes);
    for pass in passes {
        scores.add_pass(pass);
    }
    scores.bald()
}

/// Indices of the `k` highest scores, in descending score order
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    indices.truncate(k);
    indices
}

fn entropy_bits(probs: &[f32]) -> f32 {
    -probs
        .iter()
        .map(|&p| p * p.max(EPS).log2())
        .sum::<f32>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_of_uniform() {
        // Uniform over 4 classes has entropy 2 bits
        let probs = vec![0.25f32; 4];
        assert!((entropy_bits(&probs) - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_entropy_of_point_mass() {
        let probs = vec![1.0f32, 0.0, 0.0, 0.0];
        assert!(entropy_bits(&probs).abs() < 1e-5);
    }

    #[test]
    fn test_agreement_scores_zero() {
        // Identical passes carry no disagreement, whatever the entropy
        let pass = vec![0.25f32, 0.25, 0.25, 0.25, 0.9, 0.05, 0.03, 0.02];
        let scores = bald_scores(&[pass.clone(), pass.clone(), pass], 2, 4);

        for score in scores {
            assert!(score.abs() < 1e-5);
        }
    }

    #[test]
    fn test_disagreement_scores_positive() {
        // Each pass confident, but about different classes
        let pass_a = vec![1.0f32, 0.0];
        let pass_b = vec![0.0f32, 1.0];
        let scores = bald_scores(&[pass_a, pass_b], 1, 2);

        // H[mean] = 1 bit, mean H = 0 bits
        assert!((scores[0] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_disagreement_outranks_uncertainty() {
        // Point 0: consistently uniform (aleatoric). Point 1: confident
        // but flip-flopping (epistemic). BALD must prefer point 1.
        let pass_a = vec![0.5f32, 0.5, 0.99, 0.01];
        let pass_b = vec![0.5f32, 0.5, 0.01, 0.99];
        let scores = bald_scores(&[pass_a, pass_b], 2, 2);

        assert!(scores[1] > scores[0]);
        assert_eq!(top_k_indices(&scores, 1), vec![1]);
    }

    #[test]
    fn test_top_k_descending_order() {
        let scores = vec![0.1f32, 0.9, 0.4, 0.7];
        assert_eq!(top_k_indices(&scores, 3), vec![1, 3, 2]);
    }

    #[test]
    fn test_top_k_larger_than_input() {
        let scores = vec![0.2f32, 0.1];
        assert_eq!(top_k_indices(&scores, 10), vec![0, 1]);
    }

    #[test]
    #[should_panic(expected = "shape mismatch")]
    fn test_shape_mismatch_panics() {
        let mut scores = DropoutScores::new(2, 4);
        scores.add_pass(&[0.5, 0.5]);
    }
}

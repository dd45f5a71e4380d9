//! Tests for the advanced network
//!
//! This file tests:
//! - batch normalization, dropout and residual wiring
//! - the exact backward pass (including batch-norm γ/β) against numerical gradients
//! - training and inference mode behavior
//! - document round trips

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};
use neuropet::network::{AdvancedConfig, AdvancedNetwork, Mode, Network, NetworkKind};
use neuropet::utils::lr_scheduler::LRScheduler;
use neuropet::utils::SeededRng;

fn network(config: &AdvancedConfig, seed: u64) -> AdvancedNetwork {
    let mut rng = SeededRng::new(seed);
    AdvancedNetwork::new(config, &mut rng).unwrap()
}

/// Small network with every feature switched on except dropout.
fn checkable() -> AdvancedNetwork {
    let config = AdvancedConfig {
        dropout_rate: 0.0,
        ..AdvancedConfig::new(2, vec![3, 3], 1)
    };
    network(&config, 31)
}

fn batch() -> (Array2<f64>, Array2<f64>) {
    (
        array![[0.5, -0.8], [1.2, 0.1], [-0.4, 0.9], [0.3, 0.3]],
        array![[0.2], [0.9], [0.4], [0.7]],
    )
}

fn training_loss(net: &AdvancedNetwork, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
    let mut rng = SeededRng::new(0);
    net.loss(x, y, Mode::Training(&mut rng)).unwrap()
}

// ============================================================================
// Gradient Checking Tests
// ============================================================================

#[cfg(test)]
mod gradient_checking_tests {
    use super::*;

    const H: f64 = 1e-5;
    const TOLERANCE: f64 = 1e-4;

    #[test]
    fn test_dense_gradients_through_batch_norm_and_residual() {
        let mut net = checkable();
        let (x, y) = batch();
        let mut rng = SeededRng::new(0);
        let analytic = net.gradients(&x, &y, &mut rng).unwrap();

        for layer in 0..3 {
            let (rows, cols) = net.layers()[layer].weights().dim();
            for r in 0..rows {
                for c in 0..cols {
                    let original = net.layers()[layer].weights()[[r, c]];
                    net.layer_mut(layer).unwrap().weights_mut()[[r, c]] = original + H;
                    let plus = training_loss(&net, &x, &y);
                    net.layer_mut(layer).unwrap().weights_mut()[[r, c]] = original - H;
                    let minus = training_loss(&net, &x, &y);
                    net.layer_mut(layer).unwrap().weights_mut()[[r, c]] = original;

                    let numerical = (plus - minus) / (2.0 * H);
                    assert_abs_diff_eq!(analytic.weights[layer][[r, c]], numerical, epsilon = TOLERANCE);
                }
            }
        }
    }

    #[test]
    fn test_batch_norm_parameter_gradients() {
        let mut net = checkable();
        let (x, y) = batch();
        let mut rng = SeededRng::new(0);
        let analytic = net.gradients(&x, &y, &mut rng).unwrap();
        // Three dense layers first, then one γ (weights) and β (biases) per hidden layer.
        assert_eq!(analytic.weights.len(), 5);
        assert_eq!(analytic.biases.len(), 5);

        for bn in 0..2 {
            for c in 0..3 {
                let original = net.batch_norms()[bn].gamma()[[0, c]];
                net.batch_norm_mut(bn).unwrap().gamma_mut()[[0, c]] = original + H;
                let plus = training_loss(&net, &x, &y);
                net.batch_norm_mut(bn).unwrap().gamma_mut()[[0, c]] = original - H;
                let minus = training_loss(&net, &x, &y);
                net.batch_norm_mut(bn).unwrap().gamma_mut()[[0, c]] = original;
                assert_abs_diff_eq!(analytic.weights[3 + bn][[0, c]], (plus - minus) / (2.0 * H), epsilon = TOLERANCE);

                let original = net.batch_norms()[bn].beta()[[0, c]];
                net.batch_norm_mut(bn).unwrap().beta_mut()[[0, c]] = original + H;
                let plus = training_loss(&net, &x, &y);
                net.batch_norm_mut(bn).unwrap().beta_mut()[[0, c]] = original - H;
                let minus = training_loss(&net, &x, &y);
                net.batch_norm_mut(bn).unwrap().beta_mut()[[0, c]] = original;
                assert_abs_diff_eq!(analytic.biases[3 + bn][[0, c]], (plus - minus) / (2.0 * H), epsilon = TOLERANCE);
            }
        }
    }

    #[test]
    fn test_gradients_without_batch_norm() {
        let config = AdvancedConfig {
            dropout_rate: 0.0,
            use_batch_norm: false,
            ..AdvancedConfig::new(3, vec![4, 4], 2)
        };
        let mut net = network(&config, 32);
        let x = array![[0.2, -0.5, 0.9]];
        let y = array![[1.0, 0.0]];
        let mut rng = SeededRng::new(0);
        let analytic = net.gradients(&x, &y, &mut rng).unwrap();
        assert_eq!(analytic.weights.len(), 3);

        let original = net.layers()[0].weights()[[2, 1]];
        net.layer_mut(0).unwrap().weights_mut()[[2, 1]] = original + H;
        let plus = training_loss(&net, &x, &y);
        net.layer_mut(0).unwrap().weights_mut()[[2, 1]] = original - H;
        let minus = training_loss(&net, &x, &y);
        assert_abs_diff_eq!(analytic.weights[0][[2, 1]], (plus - minus) / (2.0 * H), epsilon = TOLERANCE);
    }
}

// ============================================================================
// Dropout and Mode Tests
// ============================================================================

#[cfg(test)]
mod mode_tests {
    use super::*;

    #[test]
    fn test_training_mode_draws_masks() {
        let net = network(&AdvancedConfig::new(4, vec![16, 8], 2), 33);
        let x = Array2::from_elem((5, 4), 0.5);
        let mut rng = SeededRng::new(1);
        let pass = net.forward(&x, Mode::Training(&mut rng)).unwrap();
        let mask = pass.dropout_mask(0).unwrap();
        assert_eq!(mask.dim(), (5, 16));
        let keep = 1.0 / (1.0 - 0.25);
        assert!(mask.iter().all(|&m| m == 0.0 || (m - keep).abs() < 1e-12));
        assert!(mask.iter().any(|&m| m == 0.0));
    }

    #[test]
    fn test_inference_is_deterministic_and_maskless() {
        let net = network(&AdvancedConfig::new(4, vec![8], 2), 34);
        let x = array![[0.1, 0.2, 0.3, 0.4]];
        let pass = net.forward(&x, Mode::Inference).unwrap();
        assert!(pass.dropout_mask(0).is_none());
        let first = net.predict(&x).unwrap();
        for _ in 0..5 {
            assert_eq!(net.predict(&x).unwrap(), first);
        }
    }

    #[test]
    fn test_forward_does_not_touch_running_statistics() {
        let net = network(&AdvancedConfig::new(2, vec![3], 1), 35);
        let (x, _) = batch();
        let before = net.batch_norms()[0].running_mean().clone();
        let mut rng = SeededRng::new(2);
        net.forward(&x, Mode::Training(&mut rng)).unwrap();
        assert_eq!(net.batch_norms()[0].running_mean(), &before);
    }

    #[test]
    fn test_train_step_commits_running_statistics() {
        let mut net = network(&AdvancedConfig::new(2, vec![3], 1), 35);
        let (x, y) = batch();
        let before = net.batch_norms()[0].running_mean().clone();
        let mut rng = SeededRng::new(2);
        net.train_step(&x, &y, &mut rng).unwrap();
        assert_ne!(net.batch_norms()[0].running_mean(), &before);
    }

    #[test]
    fn test_single_sample_training_keeps_running_statistics() {
        let mut net = network(&AdvancedConfig::new(2, vec![3], 1), 36);
        let mut rng = SeededRng::new(3);
        let before = net.batch_norms()[0].running_var().clone();
        net.train_one(&[0.4, 0.6], &[1.0], &mut rng).unwrap();
        assert_eq!(net.batch_norms()[0].running_var(), &before);
    }
}

// ============================================================================
// Training Tests
// ============================================================================

#[cfg(test)]
mod training_tests {
    use super::*;

    #[test]
    fn test_training_reduces_loss() {
        let config = AdvancedConfig {
            learning_rate: 0.01,
            dropout_rate: 0.0,
            ..AdvancedConfig::new(2, vec![8, 8], 1)
        };
        let mut net = network(&config, 37);
        let (x, y) = batch();
        let mut rng = SeededRng::new(4);
        let before = net.loss(&x, &y, Mode::Inference).unwrap();
        for _ in 0..300 {
            net.train_step(&x, &y, &mut rng).unwrap();
        }
        assert!(net.loss(&x, &y, Mode::Inference).unwrap() < before);
    }

    #[test]
    fn test_scheduler_advances_per_step() {
        let mut net = network(&AdvancedConfig::new(2, vec![3], 1), 38);
        let (x, y) = batch();
        let mut rng = SeededRng::new(5);
        for _ in 0..4 {
            net.train_step(&x, &y, &mut rng).unwrap();
        }
        assert_eq!(net.lr_scheduler().current_step(), 4);
        assert!(net.lr_scheduler().get_lr() < 0.001);
    }
}

// ============================================================================
// Serialization Tests
// ============================================================================

#[cfg(test)]
mod document_tests {
    use super::*;

    #[test]
    fn test_round_trip_after_training() {
        let mut net = network(&AdvancedConfig::new(3, vec![4, 4], 2), 39);
        let x = array![[0.1, 0.5, 0.9], [0.7, 0.3, 0.2]];
        let y = array![[1.0, 0.0], [0.0, 1.0]];
        let mut rng = SeededRng::new(6);
        net.train_step(&x, &y, &mut rng).unwrap();

        let json = serde_json::to_string(&net.to_document()).unwrap();
        let restored = AdvancedNetwork::from_document(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(serde_json::to_string(&restored.to_document()).unwrap(), json);
        assert_eq!(restored.predict(&x).unwrap(), net.predict(&x).unwrap());
        assert_eq!(restored.lr_scheduler().current_step(), 1);
    }

    #[test]
    fn test_tagged_document() {
        let net = network(&AdvancedConfig::new(3, vec![4], 2), 40);
        let doc = net.to_network_document();
        assert_eq!(doc.kind(), NetworkKind::Advanced);
        assert_eq!(serde_json::to_value(&doc).unwrap()["type"], "advanced");
    }
}

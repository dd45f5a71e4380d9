//! Tests for the feedforward network
//!
//! This file tests:
//! - forward-pass shapes and determinism
//! - backpropagation against central-difference numerical gradients
//! - end-to-end convergence with Adam
//! - parameter copies and document round trips

use approx::assert_abs_diff_eq;
use ndarray::{array, Array2};
use neuropet::network::{
    AnyNetwork, FeedForwardConfig, FeedForwardNetwork, Network, NetworkDocument, NetworkKind, OutputActivation,
};
use neuropet::optimizers::OptimizerType;
use neuropet::utils::SeededRng;
use neuropet::EngineError;

fn network(sizes: (usize, Vec<usize>, usize), seed: u64) -> FeedForwardNetwork {
    let mut rng = SeededRng::new(seed);
    FeedForwardNetwork::new(&FeedForwardConfig::new(sizes.0, sizes.1, sizes.2), &mut rng).unwrap()
}

// ============================================================================
// Forward Pass Tests
// ============================================================================

#[cfg(test)]
mod forward_tests {
    use super::*;

    #[test]
    fn test_forward_returns_every_activation() {
        let net = network((4, vec![5, 3], 2), 1);
        let x = Array2::from_elem((6, 4), 0.25);
        let activations = net.forward(&x).unwrap();
        assert_eq!(activations.len(), 4);
        assert_eq!(activations[1].dim(), (6, 5));
        assert_eq!(activations[3].dim(), (6, 2));
        assert!(activations[3].iter().all(|&v| v > 0.0 && v < 1.0));
    }

    #[test]
    fn test_inference_is_bit_identical() {
        let net = network((3, vec![4], 2), 2);
        let input = [0.3, -0.1, 0.9];
        let first = net.predict_one(&input).unwrap();
        for _ in 0..10 {
            assert_eq!(net.predict_one(&input).unwrap(), first);
        }
    }

    #[test]
    fn test_same_seed_same_network() {
        let a = network((3, vec![4], 1), 9);
        let b = network((3, vec![4], 1), 9);
        assert_eq!(a.to_document(), b.to_document());
    }

    #[test]
    fn test_wrong_input_width_rejected() {
        let net = network((3, vec![4], 1), 3);
        assert!(matches!(
            net.predict_one(&[1.0, 2.0]),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let net = network((2, vec![2], 1), 3);
        assert!(net.predict_one(&[f64::NAN, 0.0]).is_err());
    }
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
    fn test_weight_gradients_match_numerical() {
        let mut net = network((2, vec![3], 1), 17);
        let x = array![[0.5, -0.8]];
        let y = array![[0.3]];
        let analytic = net.gradients(&x, &y).unwrap();

        for layer in 0..2 {
            let (rows, cols) = analytic.weights[layer].dim();
            for r in 0..rows {
                for c in 0..cols {
                    let original = net.layers()[layer].weights()[[r, c]];
                    net.layer_mut(layer).unwrap().weights_mut()[[r, c]] = original + H;
                    let plus = net.loss(&x, &y).unwrap();
                    net.layer_mut(layer).unwrap().weights_mut()[[r, c]] = original - H;
                    let minus = net.loss(&x, &y).unwrap();
                    net.layer_mut(layer).unwrap().weights_mut()[[r, c]] = original;

                    let numerical = (plus - minus) / (2.0 * H);
                    assert_abs_diff_eq!(analytic.weights[layer][[r, c]], numerical, epsilon = TOLERANCE);
                }
            }
        }
    }

    #[test]
    fn test_bias_gradients_match_numerical_on_a_batch() {
        let mut net = network((2, vec![3], 2), 18);
        let x = array![[0.5, -0.8], [1.2, 0.1], [-0.4, 0.9]];
        let y = array![[0.3, 0.9], [0.0, 1.0], [0.6, 0.2]];
        let analytic = net.gradients(&x, &y).unwrap();

        for layer in 0..2 {
            for c in 0..analytic.biases[layer].ncols() {
                let original = net.layers()[layer].biases()[[0, c]];
                net.layer_mut(layer).unwrap().biases_mut()[[0, c]] = original + H;
                let plus = net.loss(&x, &y).unwrap();
                net.layer_mut(layer).unwrap().biases_mut()[[0, c]] = original - H;
                let minus = net.loss(&x, &y).unwrap();
                net.layer_mut(layer).unwrap().biases_mut()[[0, c]] = original;

                let numerical = (plus - minus) / (2.0 * H);
                assert_abs_diff_eq!(analytic.biases[layer][[0, c]], numerical, epsilon = TOLERANCE);
            }
        }
    }

    #[test]
    fn test_linear_output_gradients_match_numerical() {
        let mut rng = SeededRng::new(19);
        let config = FeedForwardConfig {
            output_activation: OutputActivation::Linear,
            ..FeedForwardConfig::new(2, vec![3], 2)
        };
        let mut net = FeedForwardNetwork::new(&config, &mut rng).unwrap();
        let x = array![[0.7, 0.2]];
        let y = array![[-3.0, 4.0]];
        let analytic = net.gradients(&x, &y).unwrap();

        let original = net.layers()[1].weights()[[0, 1]];
        net.layer_mut(1).unwrap().weights_mut()[[0, 1]] = original + H;
        let plus = net.loss(&x, &y).unwrap();
        net.layer_mut(1).unwrap().weights_mut()[[0, 1]] = original - H;
        let minus = net.loss(&x, &y).unwrap();
        assert_abs_diff_eq!(analytic.weights[1][[0, 1]], (plus - minus) / (2.0 * H), epsilon = TOLERANCE);
    }
}

// ============================================================================
// Training Tests
// ============================================================================

#[cfg(test)]
mod training_tests {
    use super::*;

    #[test]
    fn test_two_point_problem_converges_with_adam() {
        let mut rng = SeededRng::new(42);
        let config = FeedForwardConfig {
            learning_rate: 0.01,
            optimizer: OptimizerType::Adam,
            ..FeedForwardConfig::new(2, vec![8], 1)
        };
        let mut net = FeedForwardNetwork::new(&config, &mut rng).unwrap();
        let x = array![[0.0, 0.0], [1.0, 1.0]];
        let y = array![[0.0], [1.0]];

        net.train(&x, &y, 500).unwrap();
        let prediction = net.predict(&x).unwrap();
        let mse = (&prediction - &y).mapv(|e| e * e).mean().unwrap();
        assert!(mse < 0.01, "mse {} after 500 epochs", mse);
    }

    #[test]
    fn test_train_batch_reports_pre_update_loss() {
        let mut net = network((2, vec![3], 1), 5);
        let x = array![[0.2, 0.4]];
        let y = array![[1.0]];
        let before = net.loss(&x, &y).unwrap();
        let reported = net.train_batch(&x, &y).unwrap();
        assert_eq!(reported, before);
        assert!(net.loss(&x, &y).unwrap() < before);
    }

    #[test]
    fn test_mismatched_targets_rejected() {
        let mut net = network((2, vec![3], 1), 6);
        let err = net.train_batch(&array![[0.0, 1.0]], &array![[1.0, 0.0]]);
        assert!(matches!(err, Err(EngineError::ShapeMismatch(_))));
    }

    #[test]
    fn test_sgd_network_learns() {
        let mut rng = SeededRng::new(8);
        let config = FeedForwardConfig {
            learning_rate: 0.1,
            optimizer: OptimizerType::Sgd,
            ..FeedForwardConfig::new(1, vec![4], 1)
        };
        let mut net = FeedForwardNetwork::new(&config, &mut rng).unwrap();
        let x = array![[1.0]];
        let y = array![[0.9]];
        let before = net.loss(&x, &y).unwrap();
        net.train(&x, &y, 50).unwrap();
        assert!(net.loss(&x, &y).unwrap() < before);
    }
}

// ============================================================================
// Parameter Copy and Serialization Tests
// ============================================================================

#[cfg(test)]
mod document_tests {
    use super::*;

    #[test]
    fn test_copy_parameters_from() {
        let source = network((3, vec![2], 1), 1);
        let mut target = network((3, vec![2], 1), 2);
        target.copy_parameters_from(&source).unwrap();
        assert_eq!(target.predict_one(&[0.1, 0.2, 0.3]).unwrap(), source.predict_one(&[0.1, 0.2, 0.3]).unwrap());

        let mut other = network((3, vec![4], 1), 3);
        assert!(other.copy_parameters_from(&source).is_err());
    }

    #[test]
    fn test_round_trip_after_training() {
        let mut net = network((2, vec![3], 1), 4);
        for _ in 0..3 {
            net.train_one(&[0.1, 0.9], &[1.0]).unwrap();
        }
        let json = serde_json::to_string(&net.to_document()).unwrap();
        let restored = FeedForwardNetwork::from_document(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(serde_json::to_string(&restored.to_document()).unwrap(), json);
        assert_eq!(restored.predict_one(&[0.1, 0.9]).unwrap(), net.predict_one(&[0.1, 0.9]).unwrap());
    }

    #[test]
    fn test_document_with_wrong_weights_rejected() {
        let net = network((2, vec![3], 1), 4);
        let mut doc = net.to_document();
        doc.weights[1] = Array2::zeros((2, 1));
        assert!(matches!(
            FeedForwardNetwork::from_document(doc),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_tagged_document_dispatch() {
        let net = network((2, vec![3], 1), 4);
        let doc = net.to_network_document();
        assert_eq!(doc.kind(), NetworkKind::Dense);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "dense");

        let parsed: NetworkDocument = serde_json::from_value(json).unwrap();
        let mut any = AnyNetwork::from_document(parsed).unwrap();
        assert_eq!(any.input_size(), 2);
        assert_eq!(any.parameter_count(), net.parameter_count());
        assert_eq!(any.predict_vector(&[0.4, 0.6]).unwrap(), net.predict_one(&[0.4, 0.6]).unwrap());
    }
}

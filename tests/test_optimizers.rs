//! Tests for optimizers and gradient clipping
//!
//! This file tests:
//! - SGD: plain `w -= lr * g` updates
//! - Adam: bias-corrected steps converging to `lr * sign(g)`
//! - RMSprop: steps scaled by the running RMS of the gradient
//! - global-norm clipping
//! - serialized optimizer state

use approx::assert_relative_eq;
use ndarray::{array, Array2};
use neuropet::optimizers::{clip_gradients, global_norm, Adam, Optimizer, OptimizerKind, RmsProp, Sgd};
use neuropet::EngineError;

/// Apply one update to a single weight/bias pair.
fn step<O: Optimizer>(
    optimizer: &mut O,
    w: &mut Array2<f64>,
    b: &mut Array2<f64>,
    gw: &Array2<f64>,
    gb: &Array2<f64>,
) {
    optimizer
        .update(&mut [w], &mut [b], std::slice::from_ref(gw), std::slice::from_ref(gb))
        .unwrap();
}

// ============================================================================
// SGD Tests
// ============================================================================

#[cfg(test)]
mod sgd_tests {
    use super::*;

    #[test]
    fn test_sgd_update_rule() {
        let mut sgd = Sgd::new(0.1).unwrap();
        let mut w = array![[1.0, -1.0]];
        let mut b = array![[0.5]];
        step(&mut sgd, &mut w, &mut b, &array![[2.0, -4.0]], &array![[1.0]]);
        assert_relative_eq!(w[[0, 0]], 0.8, epsilon = 1e-12);
        assert_relative_eq!(w[[0, 1]], -0.6, epsilon = 1e-12);
        assert_relative_eq!(b[[0, 0]], 0.4, epsilon = 1e-12);
        assert_eq!(sgd.step_count(), 1);
    }

    #[test]
    fn test_shape_mismatch_leaves_parameters_untouched() {
        let mut sgd = Sgd::new(0.1).unwrap();
        let mut w = array![[1.0, 2.0]];
        let mut b = array![[0.0]];
        let result = sgd.update(&mut [&mut w], &mut [&mut b], &[array![[1.0]]], &[array![[1.0]]]);
        assert!(matches!(result, Err(EngineError::ShapeMismatch(_))));
        assert_eq!(w, array![[1.0, 2.0]]);
        assert_eq!(sgd.step_count(), 0);
    }
}

// ============================================================================
// Adam Tests
// ============================================================================

#[cfg(test)]
mod adam_tests {
    use super::*;

    #[test]
    fn test_adam_step_converges_to_signed_learning_rate() {
        let lr = 0.01;
        let mut adam = Adam::with_learning_rate(lr).unwrap();
        let mut w = array![[0.0, 0.0]];
        let mut b = array![[0.0]];
        let gw = array![[3.0, -0.2]];
        let gb = array![[0.5]];

        let mut last_step = [0.0; 2];
        for _ in 0..2000 {
            let before = w.clone();
            step(&mut adam, &mut w, &mut b, &gw, &gb);
            last_step = [w[[0, 0]] - before[[0, 0]], w[[0, 1]] - before[[0, 1]]];
        }
        assert_relative_eq!(last_step[0], -lr, epsilon = 1e-6);
        assert_relative_eq!(last_step[1], lr, epsilon = 1e-6);
        assert_eq!(adam.step_count(), 2000);
    }

    #[test]
    fn test_adam_first_step_is_bias_corrected() {
        let mut adam = Adam::with_learning_rate(0.001).unwrap();
        let mut w = array![[1.0]];
        let mut b = array![[1.0]];
        step(&mut adam, &mut w, &mut b, &array![[100.0]], &array![[-0.01]]);
        // m_hat = g and v_hat = g² after one step, so the move is lr regardless of |g|.
        assert_relative_eq!(w[[0, 0]], 0.999, epsilon = 1e-9);
        assert_relative_eq!(b[[0, 0]], 1.001, epsilon = 1e-6);
    }

    #[test]
    fn test_adam_rejects_bad_hyperparameters() {
        assert!(Adam::new(0.001, 1.0, 0.999, 1e-8).is_err());
        assert!(Adam::new(-0.001, 0.9, 0.999, 1e-8).is_err());
        assert!(Adam::new(0.001, 0.9, 0.999, 0.0).is_err());
    }

    #[test]
    fn test_adam_reset_clears_state() {
        let mut adam = Adam::with_learning_rate(0.01).unwrap();
        let mut w = array![[0.0]];
        let mut b = array![[0.0]];
        step(&mut adam, &mut w, &mut b, &array![[1.0]], &array![[1.0]]);
        assert!(adam.is_initialized());
        adam.reset();
        assert!(!adam.is_initialized());
        assert_eq!(adam.step_count(), 0);
    }
}

// ============================================================================
// RMSprop Tests
// ============================================================================

#[cfg(test)]
mod rmsprop_tests {
    use super::*;

    #[test]
    fn test_rmsprop_first_step_size() {
        let mut rms = RmsProp::with_learning_rate(0.01).unwrap();
        let mut w = array![[0.0]];
        let mut b = array![[0.0]];
        step(&mut rms, &mut w, &mut b, &array![[2.0]], &array![[0.0]]);
        // cache = 0.1 * 4, step = 0.01 * 2 / sqrt(0.4)
        assert_relative_eq!(w[[0, 0]], -0.02 / 0.4f64.sqrt(), epsilon = 1e-9);
        assert_eq!(b[[0, 0]], 0.0);
    }

    #[test]
    fn test_rmsprop_steps_shrink_under_constant_gradient() {
        let mut rms = RmsProp::with_learning_rate(0.01).unwrap();
        let mut w = array![[0.0]];
        let mut b = array![[0.0]];
        let mut previous = f64::INFINITY;
        for _ in 0..20 {
            let before = w[[0, 0]];
            step(&mut rms, &mut w, &mut b, &array![[1.0]], &array![[1.0]]);
            let size = (w[[0, 0]] - before).abs();
            assert!(size < previous);
            previous = size;
        }
    }
}

// ============================================================================
// Gradient Clipping Tests
// ============================================================================

#[cfg(test)]
mod clipping_tests {
    use super::*;

    #[test]
    fn test_global_norm_spans_all_tensors() {
        let grads = vec![array![[3.0]], array![[4.0, 0.0]]];
        assert_relative_eq!(global_norm(&grads), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_double_norm_is_halved() {
        let max_norm = 5.0;
        let original = vec![array![[6.0, 0.0]], array![[0.0, 8.0]]];
        let mut grads = original.clone();
        let norm = clip_gradients(&mut grads, max_norm);
        assert_relative_eq!(norm, 2.0 * max_norm, epsilon = 1e-12);
        for (clipped, raw) in grads.iter().zip(&original) {
            for (c, r) in clipped.iter().zip(raw.iter()) {
                assert_relative_eq!(*c, 0.5 * r, epsilon = 1e-6);
            }
        }
        assert_relative_eq!(global_norm(&grads), max_norm, epsilon = 1e-5);
    }
}

// ============================================================================
// Serialization Tests
// ============================================================================

#[cfg(test)]
mod serialization_tests {
    use super::*;

    #[test]
    fn test_adam_state_round_trip() {
        let mut kind = OptimizerKind::Adam(Adam::with_learning_rate(0.01).unwrap());
        let mut w = array![[0.3, -0.7]];
        let mut b = array![[0.1]];
        for _ in 0..3 {
            step(&mut kind, &mut w, &mut b, &array![[0.2, 0.1]], &array![[-0.5]]);
        }
        let json = serde_json::to_string(&kind).unwrap();
        assert!(json.contains("\"type\":\"adam\""));
        let restored: OptimizerKind = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, kind);
        assert_eq!(serde_json::to_string(&restored).unwrap(), json);
    }

    #[test]
    fn test_rmsprop_tag() {
        let kind = OptimizerKind::RmsProp(RmsProp::with_learning_rate(0.01).unwrap());
        let value = serde_json::to_value(&kind).unwrap();
        assert_eq!(value["type"], "rmsprop");
        assert_eq!(kind.name(), "rmsprop");
    }
}

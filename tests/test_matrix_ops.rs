// Tests for the matrix helpers shared by every network: nested-list
// conversion, row stacking, shape and finiteness checks, and argmax.

use approx::assert_relative_eq;
use ndarray::array;
use neuropet::utils::matrix::{
    argmax, ensure_finite, ensure_shape, from_nested, row_vector, stack_rows, to_nested,
};
use neuropet::EngineError;

// ============================================================================
// Nested List Conversion Tests
// ============================================================================

#[cfg(test)]
mod nested_tests {
    use super::*;

    #[test]
    fn test_to_nested_is_row_major() {
        let m = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert_eq!(to_nested(&m), vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
    }

    #[test]
    fn test_from_nested_rebuilds_matrix() {
        let m = from_nested(&[vec![0.5, -1.5], vec![2.0, 0.0], vec![1.0, 1.0]]).unwrap();
        assert_eq!(m.dim(), (3, 2));
        assert_relative_eq!(m[[0, 1]], -1.5);
        assert_relative_eq!(m[[1, 0]], 2.0);
    }

    #[test]
    fn test_from_nested_empty() {
        let m = from_nested(&[]).unwrap();
        assert_eq!(m.dim(), (0, 0));
    }

    #[test]
    fn test_from_nested_ragged_rejected() {
        let result = from_nested(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(result, Err(EngineError::SerializationError(_))));
    }
}

// ============================================================================
// Construction Tests
// ============================================================================

#[cfg(test)]
mod construction_tests {
    use super::*;

    #[test]
    fn test_row_vector_shape() {
        let v = row_vector(&[1.0, 2.0, 3.0]);
        assert_eq!(v, array![[1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_stack_rows() {
        let m = stack_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2).unwrap();
        assert_eq!(m, array![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn test_stack_rows_empty_keeps_width() {
        let m = stack_rows(&[], 4).unwrap();
        assert_eq!(m.dim(), (0, 4));
    }

    #[test]
    fn test_stack_rows_width_mismatch() {
        let result = stack_rows(&[vec![1.0, 2.0], vec![3.0, 4.0, 5.0]], 2);
        assert!(matches!(result, Err(EngineError::ShapeMismatch(_))));
    }
}

// ============================================================================
// Check and Selection Tests
// ============================================================================

#[cfg(test)]
mod check_tests {
    use super::*;

    #[test]
    fn test_ensure_shape() {
        let m = array![[1.0, 2.0]];
        assert!(ensure_shape("row", &m, (1, 2)).is_ok());
        assert!(matches!(
            ensure_shape("row", &m, (2, 1)),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite("ok", &array![[1.0, -2.0]]).is_ok());
        assert!(matches!(
            ensure_finite("nan", &array![[1.0, f64::NAN]]),
            Err(EngineError::NonFinite(_))
        ));
        assert!(ensure_finite("inf", &array![[f64::INFINITY]]).is_err());
    }

    #[test]
    fn test_argmax_picks_largest() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[-3.0, -1.0, -2.0]), 1);
    }

    #[test]
    fn test_argmax_ties_go_to_first() {
        assert_eq!(argmax(&[0.5, 0.9, 0.9, 0.1]), 1);
        assert_eq!(argmax(&[1.0, 1.0]), 0);
    }

    #[test]
    fn test_argmax_empty_is_zero() {
        assert_eq!(argmax(&[]), 0);
    }
}

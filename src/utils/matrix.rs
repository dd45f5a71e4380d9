//! Conversions between `ndarray` matrices and the nested-list form used in
//! save documents, plus small shape helpers.
//!
//! Documents store every matrix as `Vec<Vec<f64>>` (row-major nested lists). The
//! `nested`, `nested_list` and `optional_nested_list` modules plug into
//! `#[serde(with = "...")]` so document structs can keep `Array2<f64>` fields.

use crate::error::{shape_mismatch, EngineError, Result};
use ndarray::Array2;

/// Convert a matrix into nested row lists.
pub fn to_nested(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// Build a matrix from nested row lists. All rows must have the same length.
///
/// An empty outer list yields a `0 x 0` matrix.
pub fn from_nested(rows: &[Vec<f64>]) -> Result<Array2<f64>> {
    let cols = rows.first().map_or(0, Vec::len);
    if let Some(bad) = rows.iter().find(|row| row.len() != cols) {
        return Err(EngineError::SerializationError(format!(
            "ragged matrix: expected rows of length {}, found {}",
            cols,
            bad.len()
        )));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), cols), flat)
        .map_err(|err| EngineError::SerializationError(err.to_string()))
}

/// A single row vector `1 x n`.
pub fn row_vector(values: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((1, values.len()), |(_, j)| values[j])
}

/// Stack equal-length vectors into a `rows x n` matrix.
pub fn stack_rows(rows: &[Vec<f64>], width: usize) -> Result<Array2<f64>> {
    for row in rows {
        if row.len() != width {
            return Err(shape_mismatch("stacked row", (1, width), (1, row.len())));
        }
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat)
        .map_err(|err| EngineError::ShapeMismatch(err.to_string()))
}

/// Fail with [`EngineError::ShapeMismatch`] unless `matrix` has the expected shape.
pub fn ensure_shape(context: &str, matrix: &Array2<f64>, expected: (usize, usize)) -> Result<()> {
    if matrix.dim() != expected {
        return Err(shape_mismatch(context, expected, matrix.dim()));
    }
    Ok(())
}

/// Fail with [`EngineError::NonFinite`] if any entry is NaN or infinite.
pub fn ensure_finite(context: &str, matrix: &Array2<f64>) -> Result<()> {
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(EngineError::NonFinite(context.to_string()));
    }
    Ok(())
}

/// Index of the largest entry; ties go to the first occurrence.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Serde adapter for a single `Array2<f64>` stored as nested lists.
pub mod nested {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(matrix: &Array2<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        super::to_nested(matrix).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Array2<f64>, D::Error> {
        let rows = Vec::<Vec<f64>>::deserialize(deserializer)?;
        super::from_nested(&rows).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Vec<Array2<f64>>`.
pub mod nested_list {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(matrices: &Vec<Array2<f64>>, serializer: S) -> Result<S::Ok, S::Error> {
        let nested: Vec<Vec<Vec<f64>>> = matrices.iter().map(super::to_nested).collect();
        nested.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Array2<f64>>, D::Error> {
        let nested = Vec::<Vec<Vec<f64>>>::deserialize(deserializer)?;
        nested
            .iter()
            .map(|rows| super::from_nested(rows).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Serde adapter for `Option<Vec<Array2<f64>>>`; `None` is written as `null`.
pub mod optional_nested_list {
    use ndarray::Array2;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        matrices: &Option<Vec<Array2<f64>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let nested: Option<Vec<Vec<Vec<f64>>>> = matrices
            .as_ref()
            .map(|list| list.iter().map(super::to_nested).collect());
        nested.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<Array2<f64>>>, D::Error> {
        let nested = Option::<Vec<Vec<Vec<f64>>>>::deserialize(deserializer)?;
        nested
            .map(|list| {
                list.iter()
                    .map(|rows| super::from_nested(rows).map_err(serde::de::Error::custom))
                    .collect()
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_nested_round_trip() {
        let m = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let rows = to_nested(&m);
        assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        assert_eq!(from_nested(&rows).unwrap(), m);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            from_nested(&rows),
            Err(EngineError::SerializationError(_))
        ));
    }

    #[test]
    fn test_stack_rows_checks_width() {
        let ok = stack_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]], 2).unwrap();
        assert_eq!(ok, array![[1.0, 2.0], [3.0, 4.0]]);
        assert!(matches!(
            stack_rows(&[vec![1.0]], 2),
            Err(EngineError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_argmax_first_on_ties() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7, 0.2]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}

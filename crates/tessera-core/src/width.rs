//! Feature-width inference for lazily sized layers.

use crate::{Result, Tensor, TesseraError};

/// Report the feature width of an example tensor.
///
/// - rank 0: `0`
/// - rank 1: treated as a label vector, width is `max + 1`
/// - rank ≥ 2: the trailing dimension
pub fn get_width(x: &Tensor) -> Result<usize> {
    match x.shape().ndim() {
        0 => Ok(0),
        1 => {
            let max = x
                .as_slice()
                .iter()
                .copied()
                .reduce(f32::max)
                .ok_or_else(|| {
                    TesseraError::InvalidArgument("cannot infer width of an empty vector".into())
                })?;
            if !max.is_finite() || max < 0.0 {
                return Err(TesseraError::InvalidArgument(format!(
                    "cannot infer width from label {max}"
                )));
            }
            // float-to-int casts saturate, so an overflowing label lands on
            // the checked add below
            usize::try_from(max as u64)
                .ok()
                .and_then(|w| w.checked_add(1))
                .ok_or_else(|| {
                    TesseraError::InvalidArgument(format!("label {max} is too large for a width"))
                })
        }
        _ => Ok(x.shape().dim(-1).unwrap_or(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    #[test]
    fn test_width_matrix() {
        let y = Tensor::zeros(&Shape::matrix(3, 8));
        assert_eq!(get_width(&y).unwrap(), 8);
        let y = Tensor::zeros(&Shape::new(&[2, 5, 7]));
        assert_eq!(get_width(&y).unwrap(), 7);
    }

    #[test]
    fn test_width_labels() {
        let y = Tensor::from_f32(&[0.0, 4.0, 2.0], &Shape::new(&[3])).unwrap();
        assert_eq!(get_width(&y).unwrap(), 5);
    }

    #[test]
    fn test_width_huge_label() {
        let y = Tensor::from_f32(&[3.0, 1e30], &Shape::new(&[2])).unwrap();
        assert!(matches!(get_width(&y), Err(TesseraError::InvalidArgument(_))));
    }

    #[test]
    fn test_width_rejects_negative_and_nan() {
        let y = Tensor::from_f32(&[-2.0], &Shape::new(&[1])).unwrap();
        assert!(get_width(&y).is_err());
        let y = Tensor::from_f32(&[f32::NAN, f32::NAN], &Shape::new(&[2])).unwrap();
        assert!(get_width(&y).is_err());
    }

    #[test]
    fn test_width_scalar_and_empty() {
        assert_eq!(get_width(&Tensor::zeros(&Shape::scalar())).unwrap(), 0);
        assert!(get_width(&Tensor::zeros(&Shape::new(&[0]))).is_err());
    }
}

//! Dense row-major tensors.
//!
//! `Tensor` holds f32 values (weights, activations, gradients). `IntTensor`
//! holds integer ids and remembers whether the caller handed it over as
//! `i32` or `i64`, so gradients for ids can be returned with the same dtype.

use crate::{DType, Result, Shape, TesseraError};

/// A dense f32 tensor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Shape,
}

impl Tensor {
    // ── Constructors ────────────────────────────────────────────────────

    /// Create a tensor filled with zeros.
    pub fn zeros(shape: &Shape) -> Self {
        Self {
            data: vec![0.0; shape.numel()],
            shape: shape.clone(),
        }
    }

    /// Create a tensor filled with ones.
    pub fn ones(shape: &Shape) -> Self {
        Self::full(shape, 1.0)
    }

    pub fn full(shape: &Shape, value: f32) -> Self {
        Self {
            data: vec![value; shape.numel()],
            shape: shape.clone(),
        }
    }

    /// Create a tensor from f32 data.
    pub fn from_f32(data: &[f32], shape: &Shape) -> Result<Self> {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Take ownership of `data` as a tensor of the given shape.
    pub fn from_vec(data: Vec<f32>, shape: &Shape) -> Result<Self> {
        let expected = shape.numel();
        if data.len() != expected {
            return Err(TesseraError::InvalidArgument(format!(
                "data length {} does not match shape {} (expected {})",
                data.len(),
                shape,
                expected,
            )));
        }
        Ok(Self {
            data,
            shape: shape.clone(),
        })
    }

    /// Build a `[rows.len(), N]` matrix from fixed-width rows.
    pub fn from_rows<const N: usize>(rows: &[[f32; N]]) -> Self {
        Self {
            data: rows.iter().flatten().copied().collect(),
            shape: Shape::matrix(rows.len(), N),
        }
    }

    // ── Elementwise ops ─────────────────────────────────────────────────

    fn zip_with(&self, rhs: &Tensor, f: impl Fn(f32, f32) -> f32) -> Result<Tensor> {
        if self.shape != rhs.shape {
            return Err(TesseraError::shape_mismatch(&self.shape, &rhs.shape));
        }
        Ok(Tensor {
            data: self
                .data
                .iter()
                .zip(rhs.data.iter())
                .map(|(&a, &b)| f(a, b))
                .collect(),
            shape: self.shape.clone(),
        })
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor {
            data: self.data.iter().map(|&x| f(x)).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Element-wise addition.
    pub fn add(&self, rhs: &Tensor) -> Result<Tensor> {
        self.zip_with(rhs, |a, b| a + b)
    }

    /// Element-wise subtraction.
    pub fn sub(&self, rhs: &Tensor) -> Result<Tensor> {
        self.zip_with(rhs, |a, b| a - b)
    }

    /// Element-wise multiplication.
    pub fn mul(&self, rhs: &Tensor) -> Result<Tensor> {
        self.zip_with(rhs, |a, b| a * b)
    }

    /// Element-wise division.
    pub fn div(&self, rhs: &Tensor) -> Result<Tensor> {
        self.zip_with(rhs, |a, b| a / b)
    }

    /// Multiply every element by `factor`.
    pub fn scale(&self, factor: f32) -> Tensor {
        self.map(|x| x * factor)
    }

    pub fn add_scalar(&self, value: f32) -> Tensor {
        self.map(|x| x + value)
    }

    pub fn sqrt(&self) -> Tensor {
        self.map(f32::sqrt)
    }

    /// In-place `self += rhs`. Shapes must match exactly.
    pub fn add_assign(&mut self, rhs: &Tensor) -> Result<()> {
        if self.shape != rhs.shape {
            return Err(TesseraError::shape_mismatch(&self.shape, &rhs.shape));
        }
        for (a, &b) in self.data.iter_mut().zip(rhs.data.iter()) {
            *a += b;
        }
        Ok(())
    }

    /// Sum all elements.
    pub fn sum_all(&self) -> f32 {
        self.data.iter().sum()
    }

    /// Borrow row `i` of a 2-D tensor.
    pub fn row(&self, i: usize) -> Result<&[f32]> {
        if self.shape.ndim() != 2 {
            return Err(TesseraError::InvalidArgument(format!(
                "row access requires a 2D tensor, got shape {}",
                self.shape
            )));
        }
        let (rows, cols) = (self.shape.0[0], self.shape.0[1]);
        if i >= rows {
            return Err(TesseraError::InvalidArgument(format!(
                "row {i} out of range for {rows} rows"
            )));
        }
        Ok(&self.data[i * cols..(i + 1) * cols])
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Get the tensor shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Always `DType::F32`.
    pub fn dtype(&self) -> DType {
        DType::F32
    }

    /// Number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Copy data out as Vec<f32>.
    pub fn to_vec_f32(&self) -> Vec<f32> {
        self.data.clone()
    }
}

/// A dense integer tensor, typically token or feature ids.
///
/// Values are stored widened to `i64`; `dtype` records the caller's width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntTensor {
    data: Vec<i64>,
    shape: Shape,
    dtype: DType,
}

impl IntTensor {
    /// Create an integer tensor filled with zeros.
    pub fn zeros(shape: &Shape, dtype: DType) -> Result<Self> {
        Self::from_vec_with_dtype(vec![0; shape.numel()], shape, dtype)
    }

    pub fn from_i64(data: &[i64], shape: &Shape) -> Result<Self> {
        Self::from_vec_with_dtype(data.to_vec(), shape, DType::I64)
    }

    pub fn from_i32(data: &[i32], shape: &Shape) -> Result<Self> {
        Self::from_vec_with_dtype(data.iter().map(|&v| v as i64).collect(), shape, DType::I32)
    }

    pub fn from_vec_with_dtype(data: Vec<i64>, shape: &Shape, dtype: DType) -> Result<Self> {
        if !dtype.is_integer() {
            return Err(TesseraError::InvalidArgument(format!(
                "integer tensor cannot have dtype {dtype}"
            )));
        }
        if data.len() != shape.numel() {
            return Err(TesseraError::InvalidArgument(format!(
                "data length {} does not match shape {} (expected {})",
                data.len(),
                shape,
                shape.numel(),
            )));
        }
        if dtype == DType::I32 {
            if let Some(v) = data.iter().find(|&&v| i32::try_from(v).is_err()) {
                return Err(TesseraError::InvalidArgument(format!(
                    "value {v} does not fit in i32"
                )));
            }
        }
        Ok(Self {
            data,
            shape: shape.clone(),
            dtype,
        })
    }

    /// 1-D `i64` ids.
    pub fn vector(ids: &[i64]) -> Self {
        Self {
            data: ids.to_vec(),
            shape: Shape::new(&[ids.len()]),
            dtype: DType::I64,
        }
    }

    /// `[rows.len(), N]` matrix of `i64` ids.
    pub fn matrix<const N: usize>(rows: &[[i64; N]]) -> Self {
        Self {
            data: rows.iter().flatten().copied().collect(),
            shape: Shape::matrix(rows.len(), N),
            dtype: DType::I64,
        }
    }

    /// Copy column `col` of a 2-D tensor into a 1-D vector.
    pub fn column(&self, col: usize) -> Result<Vec<i64>> {
        if self.shape.ndim() != 2 {
            return Err(TesseraError::InvalidArgument(format!(
                "column selection requires a 2D tensor, got shape {}",
                self.shape
            )));
        }
        let (rows, cols) = (self.shape.0[0], self.shape.0[1]);
        if col >= cols {
            return Err(TesseraError::InvalidArgument(format!(
                "column {col} out of range for {cols} columns"
            )));
        }
        Ok((0..rows).map(|r| self.data[r * cols + col]).collect())
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = Tensor::zeros(&Shape::new(&[2, 3]));
        assert_eq!(t.to_vec_f32(), vec![0.0; 6]);
        assert_eq!(t.shape(), &Shape::new(&[2, 3]));
    }

    #[test]
    fn test_from_f32_shape_mismatch() {
        let r = Tensor::from_f32(&[1.0, 2.0], &Shape::new(&[3]));
        assert!(r.is_err());
    }

    #[test]
    fn test_from_rows() {
        let t = Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        assert_eq!(t.shape(), &Shape::matrix(3, 2));
        assert_eq!(t.row(1).unwrap(), &[3.0, 4.0]);
        assert!(t.row(3).is_err());
    }

    #[test]
    fn test_elementwise() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0], &Shape::new(&[3])).unwrap();
        let b = Tensor::from_f32(&[4.0, 5.0, 6.0], &Shape::new(&[3])).unwrap();
        assert_eq!(a.add(&b).unwrap().to_vec_f32(), vec![5.0, 7.0, 9.0]);
        assert_eq!(b.sub(&a).unwrap().to_vec_f32(), vec![3.0, 3.0, 3.0]);
        assert_eq!(a.mul(&b).unwrap().to_vec_f32(), vec![4.0, 10.0, 18.0]);
        assert_eq!(a.scale(2.0).to_vec_f32(), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_elementwise_shape_mismatch() {
        let a = Tensor::zeros(&Shape::new(&[2]));
        let b = Tensor::zeros(&Shape::new(&[3]));
        assert!(matches!(
            a.add(&b),
            Err(TesseraError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_add_assign() {
        let mut a = Tensor::ones(&Shape::matrix(2, 2));
        let b = Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]);
        a.add_assign(&b).unwrap();
        assert_eq!(a.to_vec_f32(), vec![2.0, 3.0, 4.0, 5.0]);
        assert!(a.add_assign(&Tensor::zeros(&Shape::new(&[4]))).is_err());
    }

    #[test]
    fn test_int_tensor_dtype() {
        let ids = IntTensor::from_i32(&[1, 2, 3], &Shape::new(&[3])).unwrap();
        assert_eq!(ids.dtype(), DType::I32);
        assert_eq!(ids.as_slice(), &[1, 2, 3]);
        assert!(IntTensor::zeros(&Shape::new(&[2]), DType::F32).is_err());
        assert!(
            IntTensor::from_vec_with_dtype(vec![i64::MAX], &Shape::new(&[1]), DType::I32)
                .is_err()
        );
    }

    #[test]
    fn test_int_tensor_column() {
        let ids = IntTensor::matrix(&[[9, 1], [9, 3]]);
        assert_eq!(ids.column(1).unwrap(), vec![1, 3]);
        assert_eq!(ids.column(0).unwrap(), vec![9, 9]);
        assert!(ids.column(2).is_err());
        assert!(IntTensor::vector(&[1, 2]).column(0).is_err());
    }
}

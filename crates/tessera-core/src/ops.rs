//! Ops trait: allocation and row gather/scatter-add primitives used by
//! layers, plus the CPU reference implementation.
//!
//! Layers never allocate or scatter by hand; they go through an `Ops`
//! handle so a different implementation can be swapped in without touching
//! layer code.

use std::sync::{Arc, LazyLock};

use crate::{DType, IntTensor, Result, Shape, Tensor, TesseraError};

/// Pluggable array primitives.
pub trait Ops: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Allocate a zero-filled f32 tensor.
    fn allocate(&self, shape: &Shape) -> Tensor {
        Tensor::zeros(shape)
    }

    /// Allocate a zero-filled integer tensor.
    fn allocate_ints(&self, shape: &Shape, dtype: DType) -> Result<IntTensor> {
        IntTensor::zeros(shape, dtype)
    }

    /// Gather rows of a 2-D `table` in the order given by `ids`.
    ///
    /// Returns `[ids.len(), table_cols]`.
    fn gather_rows(&self, table: &Tensor, ids: &[usize]) -> Result<Tensor>;

    /// Add row `i` of `values` into row `ids[i]` of `dest`.
    ///
    /// Repeated ids accumulate. Shapes and ids are validated before `dest`
    /// is touched, so a failed call leaves `dest` unchanged.
    fn scatter_add(&self, dest: &mut Tensor, ids: &[usize], values: &Tensor) -> Result<()>;
}

/// Reference CPU implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuOps;

impl Ops for CpuOps {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn gather_rows(&self, table: &Tensor, ids: &[usize]) -> Result<Tensor> {
        let (rows, cols) = require_matrix(table, "gather_rows table")?;
        check_ids(ids, rows)?;
        let src = table.as_slice();
        let mut data = Vec::with_capacity(ids.len() * cols);
        for &id in ids {
            data.extend_from_slice(&src[id * cols..(id + 1) * cols]);
        }
        Tensor::from_vec(data, &Shape::matrix(ids.len(), cols))
    }

    fn scatter_add(&self, dest: &mut Tensor, ids: &[usize], values: &Tensor) -> Result<()> {
        let (rows, cols) = require_matrix(dest, "scatter_add destination")?;
        let expected = Shape::matrix(ids.len(), cols);
        if values.shape() != &expected {
            return Err(TesseraError::shape_mismatch(&expected, values.shape()));
        }
        check_ids(ids, rows)?;
        let src = values.as_slice();
        let dst = dest.as_mut_slice();
        for (i, &id) in ids.iter().enumerate() {
            let row = &src[i * cols..(i + 1) * cols];
            for (d, &v) in dst[id * cols..(id + 1) * cols].iter_mut().zip(row) {
                *d += v;
            }
        }
        Ok(())
    }
}

fn require_matrix(t: &Tensor, what: &str) -> Result<(usize, usize)> {
    match t.shape().dims() {
        &[rows, cols] => Ok((rows, cols)),
        _ => Err(TesseraError::InvalidArgument(format!(
            "{what} must be 2D, got shape {}",
            t.shape()
        ))),
    }
}

fn check_ids(ids: &[usize], rows: usize) -> Result<()> {
    match ids.iter().find(|&&id| id >= rows) {
        Some(id) => Err(TesseraError::InvalidArgument(format!(
            "row index {id} out of range for {rows} rows"
        ))),
        None => Ok(()),
    }
}

static DEFAULT_OPS: LazyLock<Arc<dyn Ops>> = LazyLock::new(|| Arc::new(CpuOps));

/// Get the process-wide default ops.
pub fn default_ops() -> Arc<dyn Ops> {
    Arc::clone(&DEFAULT_OPS)
}

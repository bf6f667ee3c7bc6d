//! Embedding layer: integer id lookup into a learnable table.
//!
//! The table has shape `[nV, nO]` and lives in the layer's `ParamStore`
//! under `"vectors"`. Its width `nO` can be left open at construction and
//! inferred from an example output passed to `initialize`.
//!
//! # Out-of-range ids
//!
//! Any id `>= nV` (and any negative id) is silently rewritten to `0` before
//! lookup, so it reads and trains row 0. No error is raised; callers that
//! need strict validation must check ids themselves.

use std::borrow::Cow;
use std::sync::Arc;

use tessera_core::{
    DType, IntTensor, Ops, Result, Shape, Tensor, TesseraError, default_ops, get_width,
};
use tracing::{debug, trace};

use crate::{Backprop, Dims, Initializer, Layer, ParamStore, UniformInit};

/// Output width.
pub const N_O: &str = "nO";
/// Vocabulary size (table rows).
pub const N_V: &str = "nV";
/// Parameter name of the table.
pub const VECTORS: &str = "vectors";

/// Embedding layer: maps integer ids to dense vectors.
///
/// Input is a 1-D `[n]` or 2-D `[n, features]` `IntTensor`; for 2-D input
/// the column chosen with [`Embed::column`] is used. Output is `[n, nO]`.
pub struct Embed {
    name: String,
    dims: Dims,
    column: usize,
    initializer: Arc<dyn Initializer>,
    ops: Arc<dyn Ops>,
    params: Arc<ParamStore>,
}

impl Default for Embed {
    fn default() -> Self {
        Self::new()
    }
}

impl Embed {
    /// Create an unresolved layer: no dims, column 0, uniform initializer.
    pub fn new() -> Self {
        let mut dims = Dims::new();
        dims.declare(N_O, None);
        dims.declare(N_V, None);
        let params = Arc::new(ParamStore::new());
        params.declare(VECTORS);
        Self {
            name: "embed".to_string(),
            dims,
            column: 0,
            initializer: Arc::new(UniformInit::default()),
            ops: default_ops(),
            params,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Output width, or `None` to infer it at `initialize`.
    pub fn n_o(mut self, n_o: impl Into<Option<usize>>) -> Self {
        self.dims.declare(N_O, n_o.into());
        self
    }

    /// Vocabulary size.
    pub fn n_v(mut self, n_v: impl Into<Option<usize>>) -> Self {
        self.dims.declare(N_V, n_v.into());
        self
    }

    /// Column to read when the input is 2-D.
    pub fn column(mut self, column: usize) -> Self {
        self.column = column;
        self
    }

    pub fn initializer(self, initializer: impl Initializer + 'static) -> Self {
        self.shared_initializer(Arc::new(initializer))
    }

    pub fn shared_initializer(mut self, initializer: Arc<dyn Initializer>) -> Self {
        self.initializer = initializer;
        self
    }

    pub fn ops(mut self, ops: Arc<dyn Ops>) -> Self {
        self.ops = ops;
        self
    }

    // ── Accessors ───────────────────────────────────────────────────────

    pub fn selector_column(&self) -> usize {
        self.column
    }

    pub fn dims(&self) -> &Dims {
        &self.dims
    }

    pub fn get_dim(&self, name: &str) -> Result<usize> {
        self.dims.get_dim(name)
    }

    pub fn has_dim(&self, name: &str) -> bool {
        self.dims.has_dim(name)
    }

    /// Resolve a dimension outside of `initialize`.
    pub fn set_dim(&mut self, name: &str, value: usize) -> Result<()> {
        self.dims.set_dim(name, value)
    }

    /// Copy of the current table.
    pub fn vectors(&self) -> Result<Tensor> {
        self.params.get_param(VECTORS)
    }

    /// Install an explicit `[nV, nO]` table, resolving both dims from it.
    pub fn set_vectors(&mut self, table: Tensor) -> Result<()> {
        let (n_v, n_o) = match table.shape().dims() {
            &[n_v, n_o] => (n_v, n_o),
            _ => {
                return Err(TesseraError::InvalidArgument(format!(
                    "embedding table must be 2D, got shape {}",
                    table.shape()
                )));
            }
        };
        // validate both before resolving either
        self.dims.check_dim(N_V, n_v)?;
        self.dims.check_dim(N_O, n_o)?;
        self.dims.set_dim(N_V, n_v)?;
        self.dims.set_dim(N_O, n_o)?;
        self.params.clear_grad(VECTORS);
        self.params.set_param(VECTORS, table);
        debug!(layer = %self.name, n_v, n_o, "installed embedding table");
        Ok(())
    }

    fn not_initialized(&self) -> TesseraError {
        TesseraError::NotInitialized {
            layer: self.name.clone(),
        }
    }

    /// Pick the id column and map every id into `[0, n_v)`.
    fn select_ids(&self, ids: &IntTensor, n_v: usize) -> Result<Vec<usize>> {
        let raw: Cow<'_, [i64]> = match ids.shape().ndim() {
            1 => Cow::Borrowed(ids.as_slice()),
            2 => Cow::Owned(ids.column(self.column)?),
            n => {
                return Err(TesseraError::InvalidArgument(format!(
                    "{} expects 1D or 2D ids, got rank {n}",
                    self.name
                )));
            }
        };
        let (clamped, n_clamped) = clamp_ids(&raw, n_v);
        if n_clamped > 0 {
            trace!(layer = %self.name, n_clamped, n_v, "out-of-range ids mapped to row 0");
        }
        Ok(clamped)
    }
}

/// Rewrite every id outside `[0, n_v)` to 0. Returns the ids and how many
/// were rewritten.
fn clamp_ids(raw: &[i64], n_v: usize) -> (Vec<usize>, usize) {
    let mut n_clamped = 0;
    let ids = raw
        .iter()
        .map(|&id| match usize::try_from(id) {
            Ok(i) if i < n_v => i,
            _ => {
                n_clamped += 1;
                0
            }
        })
        .collect();
    (ids, n_clamped)
}

impl Layer for Embed {
    type Input = IntTensor;
    type Output = Tensor;

    fn name(&self) -> &str {
        &self.name
    }

    /// Resolve `nO` (from `y` if given), allocate `[nV, nO]`, and fill it
    /// with the initializer. `x` is unused. Calling this again replaces the
    /// table and drops its gradient. On error no dimension is resolved and
    /// the previous table, if any, is kept.
    fn initialize(&mut self, _x: Option<&IntTensor>, y: Option<&Tensor>) -> Result<()> {
        let n_v = self.dims.get_dim(N_V)?;
        let n_o = match y {
            Some(y) => {
                let width = get_width(y)?;
                self.dims.check_dim(N_O, width)?;
                width
            }
            None => self.dims.get_dim(N_O)?,
        };

        let shape = Shape::matrix(n_v, n_o);
        if shape.checked_byte_len(DType::F32).is_none() {
            return Err(TesseraError::InvalidArgument(format!(
                "embedding table {shape} is too large to allocate"
            )));
        }
        let vectors = self.initializer.init(self.ops.allocate(&shape))?;
        if vectors.shape() != &shape {
            return Err(TesseraError::shape_mismatch(&shape, vectors.shape()));
        }
        self.dims.set_dim(N_O, n_o)?;
        self.params.clear_grad(VECTORS);
        self.params.set_param(VECTORS, vectors);
        debug!(layer = %self.name, n_v, n_o, ops = self.ops.name(), "initialized embedding table");
        Ok(())
    }

    /// Look up one row per id.
    ///
    /// The returned closure takes the gradient of the output (`[n, nO]`),
    /// scatter-adds it into a `[nV, nO]` buffer keyed by the clamped ids,
    /// increments the `"vectors"` gradient with it, and returns zeros shaped
    /// and typed like `ids`. It can be called more than once; each call
    /// adds again.
    fn forward(
        &self,
        ids: &IntTensor,
        is_train: bool,
    ) -> Result<(Tensor, Backprop<Tensor, IntTensor>)> {
        // clamp against the stored table, which may have been replaced
        // through the shared store
        let lookup = self.params.with_param(VECTORS, |table| {
            let n_v = table.shape().dim(0).unwrap_or(0);
            let clamped = self.select_ids(ids, n_v)?;
            let output = self.ops.gather_rows(table, &clamped)?;
            Ok::<_, TesseraError>((clamped, output, table.shape().clone()))
        });
        let (clamped, output, table_shape) = match lookup {
            Ok(found) => found?,
            Err(_) => return Err(self.not_initialized()),
        };
        debug!(layer = %self.name, n = clamped.len(), is_train, "embedding forward");

        let params = Arc::clone(&self.params);
        let ops = Arc::clone(&self.ops);
        let layer = self.name.clone();
        let out_shape = output.shape().clone();
        let in_shape = ids.shape().clone();
        let in_dtype = ids.dtype();

        let backprop: Backprop<Tensor, IntTensor> = Box::new(move |d_output: &Tensor| {
            if d_output.shape() != &out_shape {
                return Err(TesseraError::shape_mismatch(&out_shape, d_output.shape()));
            }
            let mut d_vectors = ops.allocate(&table_shape);
            ops.scatter_add(&mut d_vectors, &clamped, d_output)?;
            params.inc_grad(VECTORS, &d_vectors)?;
            debug!(layer = %layer, n = clamped.len(), "embedding backward");
            ops.allocate_ints(&in_shape, in_dtype)
        });
        Ok((output, backprop))
    }

    fn params(&self) -> &Arc<ParamStore> {
        &self.params
    }
}

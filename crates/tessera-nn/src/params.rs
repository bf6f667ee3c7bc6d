//! Parameter and gradient registry shared between a layer and its backward
//! closures.
//!
//! Layers never hold gradients themselves. Backward closures add into the
//! store through `inc_grad`, so several forward/backward cycles accumulate
//! before `finish_update` hands the totals to an optimizer. All access goes
//! through one `RwLock`; concurrent increments are serialized and none are
//! lost.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use parking_lot::RwLock;
use tessera_core::{Result, Tensor, TesseraError};
use tessera_optim::Optimizer;
use tracing::debug;

#[derive(Default)]
struct Slots {
    params: BTreeMap<String, Option<Tensor>>,
    grads: BTreeMap<String, Tensor>,
}

/// Named parameters plus their accumulated gradients.
#[derive(Default)]
pub struct ParamStore {
    slots: RwLock<Slots>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a parameter slot without a value.
    pub fn declare(&self, name: &str) {
        self.slots
            .write()
            .params
            .entry(name.to_string())
            .or_insert(None);
    }

    /// Names of all declared parameters, in order.
    pub fn param_names(&self) -> Vec<String> {
        self.slots.read().params.keys().cloned().collect()
    }

    /// True if `name` is declared and holds a value.
    pub fn has_param(&self, name: &str) -> bool {
        matches!(self.slots.read().params.get(name), Some(Some(_)))
    }

    /// Clone the current value of `name`.
    pub fn get_param(&self, name: &str) -> Result<Tensor> {
        self.with_param(name, Tensor::clone)
    }

    /// Run `f` against the value of `name` without copying it.
    pub fn with_param<R>(&self, name: &str, f: impl FnOnce(&Tensor) -> R) -> Result<R> {
        let slots = self.slots.read();
        match slots.params.get(name) {
            Some(Some(t)) => Ok(f(t)),
            _ => Err(TesseraError::MissingParam(name.to_string())),
        }
    }

    /// Store `value` under `name`, declaring it if needed.
    ///
    /// A held gradient whose shape no longer matches is dropped.
    pub fn set_param(&self, name: &str, value: Tensor) {
        let mut slots = self.slots.write();
        if slots
            .grads
            .get(name)
            .is_some_and(|g| g.shape() != value.shape())
        {
            slots.grads.remove(name);
        }
        slots.params.insert(name.to_string(), Some(value));
    }

    pub fn has_grad(&self, name: &str) -> bool {
        self.slots.read().grads.contains_key(name)
    }

    pub fn get_grad(&self, name: &str) -> Option<Tensor> {
        self.slots.read().grads.get(name).cloned()
    }

    /// Add `delta` into the gradient of `name`, starting from zero if none
    /// is held yet.
    pub fn inc_grad(&self, name: &str, delta: &Tensor) -> Result<()> {
        let mut slots = self.slots.write();
        check_grad_shape(&slots, name, delta)?;
        match slots.grads.entry(name.to_string()) {
            Entry::Occupied(mut acc) => acc.get_mut().add_assign(delta)?,
            Entry::Vacant(slot) => {
                slot.insert(delta.clone());
            }
        }
        Ok(())
    }

    /// Drop the gradient of `name`, if any.
    pub fn clear_grad(&self, name: &str) {
        self.slots.write().grads.remove(name);
    }

    /// Drop every held gradient.
    pub fn zero_grads(&self) {
        self.slots.write().grads.clear();
    }

    /// Apply `optimizer` to every parameter holding a gradient, store the
    /// results and clear the gradients.
    ///
    /// Either every update is stored or none is. Returns the number of
    /// parameters updated.
    pub fn finish_update(&self, optimizer: &mut dyn Optimizer) -> Result<usize> {
        let mut slots = self.slots.write();
        let mut updated = Vec::with_capacity(slots.grads.len());
        for (name, grad) in &slots.grads {
            let param = match slots.params.get(name) {
                Some(Some(p)) => p,
                _ => return Err(TesseraError::MissingParam(name.clone())),
            };
            updated.push((name.clone(), optimizer.update(name, param, grad)?));
        }
        let count = updated.len();
        for (name, value) in updated {
            slots.params.insert(name, Some(value));
        }
        slots.grads.clear();
        debug!(count, lr = optimizer.learning_rate(), "applied optimizer step");
        Ok(count)
    }
}

impl std::fmt::Debug for ParamStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.slots.read();
        f.debug_struct("ParamStore")
            .field("params", &slots.params.keys().collect::<Vec<_>>())
            .field("grads", &slots.grads.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn check_grad_shape(slots: &Slots, name: &str, grad: &Tensor) -> Result<()> {
    match slots.params.get(name) {
        None => Err(TesseraError::MissingParam(name.to_string())),
        Some(Some(p)) if p.shape() != grad.shape() => {
            Err(TesseraError::shape_mismatch(p.shape(), grad.shape()))
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Shape;
    use tessera_optim::Sgd;

    fn store() -> ParamStore {
        let s = ParamStore::new();
        s.declare("w");
        s
    }

    #[test]
    fn test_declared_param_has_no_value() {
        let s = store();
        assert_eq!(s.param_names(), vec!["w".to_string()]);
        assert!(!s.has_param("w"));
        assert!(s.get_param("w").unwrap_err().is_usage());
    }

    #[test]
    fn test_inc_grad_accumulates() {
        let s = store();
        s.set_param("w", Tensor::zeros(&Shape::matrix(2, 2)));
        let g = Tensor::from_rows(&[[1.0, 2.0], [3.0, 4.0]]);
        s.inc_grad("w", &g).unwrap();
        s.inc_grad("w", &g).unwrap();
        assert_eq!(s.get_grad("w").unwrap().to_vec_f32(), vec![2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_inc_grad_shape_mismatch_leaves_grad_untouched() {
        let s = store();
        s.set_param("w", Tensor::zeros(&Shape::matrix(2, 2)));
        s.inc_grad("w", &Tensor::ones(&Shape::matrix(2, 2))).unwrap();
        let err = s.inc_grad("w", &Tensor::ones(&Shape::matrix(3, 2)));
        assert!(matches!(err, Err(TesseraError::ShapeMismatch { .. })));
        assert_eq!(s.get_grad("w").unwrap().to_vec_f32(), vec![1.0; 4]);
    }

    #[test]
    fn test_inc_grad_undeclared() {
        let s = store();
        assert!(s.inc_grad("b", &Tensor::ones(&Shape::new(&[1]))).is_err());
    }

    #[test]
    fn test_set_param_drops_stale_grad() {
        let s = store();
        s.set_param("w", Tensor::zeros(&Shape::matrix(2, 2)));
        s.inc_grad("w", &Tensor::ones(&Shape::matrix(2, 2))).unwrap();
        s.set_param("w", Tensor::zeros(&Shape::matrix(2, 2)));
        assert!(s.has_grad("w"));
        s.set_param("w", Tensor::zeros(&Shape::matrix(3, 2)));
        assert!(!s.has_grad("w"));
    }

    #[test]
    fn test_finish_update_applies_and_clears() {
        let s = store();
        s.set_param("w", Tensor::ones(&Shape::new(&[2])));
        s.inc_grad("w", &Tensor::from_f32(&[1.0, 0.0], &Shape::new(&[2])).unwrap())
            .unwrap();
        let mut opt = Sgd::new(0.5, 0.0);
        assert_eq!(s.finish_update(&mut opt).unwrap(), 1);
        assert_eq!(s.get_param("w").unwrap().to_vec_f32(), vec![0.5, 1.0]);
        assert!(!s.has_grad("w"));
        // nothing left to apply
        assert_eq!(s.finish_update(&mut opt).unwrap(), 0);
    }
}

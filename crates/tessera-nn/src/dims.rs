//! Named dimension registry with deferred resolution.

use std::collections::BTreeMap;

use tessera_core::{Result, TesseraError};

/// Named dimensions of a layer (`nO`, `nV`, ...), each possibly unresolved.
///
/// A dimension is declared once, may start unset, and can be resolved later.
/// Once resolved it may be set again only to the same value.
#[derive(Debug, Clone, Default)]
pub struct Dims {
    entries: BTreeMap<&'static str, Option<usize>>,
}

impl Dims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name`, replacing any previous value.
    pub fn declare(&mut self, name: &'static str, value: Option<usize>) {
        self.entries.insert(name, value);
    }

    /// True if `name` is declared and resolved.
    pub fn has_dim(&self, name: &str) -> bool {
        matches!(self.entries.get(name), Some(Some(_)))
    }

    pub fn get_dim(&self, name: &str) -> Result<usize> {
        match self.entries.get_key_value(name) {
            Some((_, Some(v))) => Ok(*v),
            Some((&dim, None)) => Err(TesseraError::DimensionUnset { dim }),
            None => Err(TesseraError::UnknownDimension(name.to_string())),
        }
    }

    /// Resolve `name` to `value`.
    pub fn set_dim(&mut self, name: &str, value: usize) -> Result<()> {
        let (&dim, slot) = self
            .entries
            .iter_mut()
            .find(|(k, _)| **k == name)
            .ok_or_else(|| TesseraError::UnknownDimension(name.to_string()))?;
        match *slot {
            Some(old) if old != value => Err(TesseraError::DimensionConflict {
                dim,
                old,
                new: value,
            }),
            _ => {
                *slot = Some(value);
                Ok(())
            }
        }
    }

    /// Fail with `DimensionConflict` if `name` is resolved to something
    /// other than `value`. Unset or undeclared dimensions pass.
    pub fn check_dim(&self, name: &str, value: usize) -> Result<()> {
        match self.entries.get_key_value(name) {
            Some((&dim, &Some(old))) if old != value => Err(TesseraError::DimensionConflict {
                dim,
                old,
                new: value,
            }),
            _ => Ok(()),
        }
    }
}

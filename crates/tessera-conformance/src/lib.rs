//! Golden conformance testing infrastructure.
//!
//! Hand-checked embedding scenarios (table, ids, upstream gradient and the
//! expected forward output / table gradient) plus tolerance helpers shared
//! by the crate test suites.

use serde::{Deserialize, Serialize};

const EMBED_SCENARIOS: &str = include_str!("../fixtures/embed_scenarios.json");

/// One forward + backward scenario for an embedding table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedScenario {
    pub name: String,
    pub table: Vec<Vec<f32>>,
    pub ids: Vec<i64>,
    pub d_output: Vec<Vec<f32>>,
    pub output: Vec<Vec<f32>>,
    pub d_table: Vec<Vec<f32>>,
}

impl EmbedScenario {
    pub fn n_v(&self) -> usize {
        self.table.len()
    }

    pub fn n_o(&self) -> usize {
        self.table.first().map_or(0, Vec::len)
    }
}

/// Load the bundled embedding scenarios.
pub fn embed_scenarios() -> Vec<EmbedScenario> {
    serde_json::from_str(EMBED_SCENARIOS).expect("bundled embed fixtures are valid JSON")
}

/// Flatten nested rows into one row-major buffer.
pub fn flatten(rows: &[Vec<f32>]) -> Vec<f32> {
    rows.iter().flatten().copied().collect()
}

/// Assert two f32 slices are element-wise close.
pub fn assert_allclose(a: &[f32], b: &[f32], atol: f32, rtol: f32) {
    assert_eq!(
        a.len(),
        b.len(),
        "length mismatch: got={} expected={}",
        a.len(),
        b.len()
    );
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "mismatch at [{i}]: got={x} expected={y} diff={diff} tol={tol}"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allclose_exact() {
        assert_allclose(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 1e-6, 1e-6);
    }

    #[test]
    fn test_allclose_within_tolerance() {
        assert_allclose(&[1.0001], &[1.0], 1e-3, 1e-3);
    }

    #[test]
    #[should_panic(expected = "mismatch")]
    fn test_allclose_fails() {
        assert_allclose(&[1.0], &[2.0], 1e-6, 1e-6);
    }

    #[test]
    fn test_scenarios_are_consistent() {
        let scenarios = embed_scenarios();
        assert!(!scenarios.is_empty());
        for s in &scenarios {
            assert_eq!(s.ids.len(), s.output.len(), "{}", s.name);
            assert_eq!(s.ids.len(), s.d_output.len(), "{}", s.name);
            assert_eq!(s.d_table.len(), s.n_v(), "{}", s.name);
            assert!(s.output.iter().all(|r| r.len() == s.n_o()), "{}", s.name);
        }
    }
}

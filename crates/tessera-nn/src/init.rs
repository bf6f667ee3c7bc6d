//! Initialization policies for freshly allocated parameter tables.
//!
//! An initializer receives the zero-filled table and returns a table of the
//! same shape holding starting values. Any
//! `Fn(Tensor) -> Result<Tensor> + Send + Sync` closure qualifies.
//!
//! Seeded initializers build a local `StdRng` per call and are therefore
//! deterministic; unseeded ones draw a fresh seed from the OS.

use rand::SeedableRng;
use rand::distr::Uniform;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tessera_core::{Result, Tensor, TesseraError};

/// Fills an allocated table with starting values.
pub trait Initializer: Send + Sync {
    fn init(&self, zeros: Tensor) -> Result<Tensor>;
}

impl<F> Initializer for F
where
    F: Fn(Tensor) -> Result<Tensor> + Send + Sync,
{
    fn init(&self, zeros: Tensor) -> Result<Tensor> {
        self(zeros)
    }
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(value) => StdRng::seed_from_u64(value),
        None => StdRng::from_os_rng(),
    }
}

fn fill_uniform(mut t: Tensor, lo: f32, hi: f32, seed: Option<u64>) -> Result<Tensor> {
    if !(lo.is_finite() && hi.is_finite() && lo < hi) {
        return Err(TesseraError::InvalidArgument(format!(
            "uniform bounds must satisfy lo < hi, got [{lo}, {hi})"
        )));
    }
    // finite bounds can still span a non-finite range
    let dist = Uniform::new(lo, hi).map_err(|e| {
        TesseraError::InvalidArgument(format!("invalid uniform range [{lo}, {hi}): {e}"))
    })?;
    let mut rng = seeded_rng(seed);
    for v in t.as_mut_slice() {
        *v = dist.sample(&mut rng);
    }
    Ok(t)
}

/// Uniform values in `[lo, hi)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformInit {
    pub lo: f32,
    pub hi: f32,
    pub seed: Option<u64>,
}

impl Default for UniformInit {
    fn default() -> Self {
        Self {
            lo: -0.1,
            hi: 0.1,
            seed: None,
        }
    }
}

impl UniformInit {
    pub fn new(lo: f32, hi: f32) -> Self {
        Self { lo, hi, seed: None }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for UniformInit {
    fn init(&self, zeros: Tensor) -> Result<Tensor> {
        fill_uniform(zeros, self.lo, self.hi, self.seed)
    }
}

/// Gaussian values with the given mean and standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalInit {
    pub mean: f32,
    pub std: f32,
    pub seed: Option<u64>,
}

impl NormalInit {
    pub fn new(mean: f32, std: f32) -> Self {
        Self {
            mean,
            std,
            seed: None,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Initializer for NormalInit {
    fn init(&self, mut zeros: Tensor) -> Result<Tensor> {
        let dist = Normal::new(self.mean, self.std).map_err(|e| {
            TesseraError::InvalidArgument(format!("invalid normal distribution: {e}"))
        })?;
        let mut rng = seeded_rng(self.seed);
        for v in zeros.as_mut_slice() {
            *v = dist.sample(&mut rng);
        }
        Ok(zeros)
    }
}

/// Uniform values in `±sqrt(6 / (rows + cols))`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlorotUniformInit {
    pub seed: Option<u64>,
}

impl Initializer for GlorotUniformInit {
    fn init(&self, zeros: Tensor) -> Result<Tensor> {
        let fan: usize = zeros.shape().dims().iter().take(2).sum();
        if fan == 0 || zeros.numel() == 0 {
            return Ok(zeros);
        }
        let scale = (6.0 / fan as f32).sqrt();
        fill_uniform(zeros, -scale, scale, self.seed)
    }
}

/// Leaves the table at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ZeroInit;

impl Initializer for ZeroInit {
    fn init(&self, zeros: Tensor) -> Result<Tensor> {
        Ok(zeros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Shape;

    fn zeros() -> Tensor {
        Tensor::zeros(&Shape::matrix(16, 8))
    }

    #[test]
    fn test_uniform_default_range() {
        let t = UniformInit::default().init(zeros()).unwrap();
        assert_eq!(t.shape(), &Shape::matrix(16, 8));
        assert!(t.as_slice().iter().all(|&v| (-0.1..0.1).contains(&v)));
        assert!(t.as_slice().iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_uniform_seeded_is_deterministic() {
        let init = UniformInit::new(-1.0, 1.0).seed(7);
        let a = init.init(zeros()).unwrap();
        let b = init.init(zeros()).unwrap();
        assert_eq!(a, b);
        let c = UniformInit::new(-1.0, 1.0).seed(8).init(zeros()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_uniform_rejects_empty_range() {
        assert!(UniformInit::new(0.5, 0.5).init(zeros()).is_err());
        assert!(UniformInit::new(1.0, -1.0).init(zeros()).is_err());
    }

    #[test]
    fn test_uniform_rejects_overflowing_span() {
        let err = UniformInit::new(-3e38, 3e38).init(zeros()).unwrap_err();
        assert!(matches!(err, TesseraError::InvalidArgument(_)));
    }

    #[test]
    fn test_normal_seeded() {
        let init = NormalInit::new(0.0, 0.02).seed(3);
        let a = init.init(zeros()).unwrap();
        assert_eq!(a, init.init(zeros()).unwrap());
        let mean: f32 = a.sum_all() / a.numel() as f32;
        assert!(mean.abs() < 0.02, "mean {mean} too far from 0");
        assert!(NormalInit::new(0.0, -1.0).init(zeros()).is_err());
    }

    #[test]
    fn test_glorot_bounds() {
        let t = GlorotUniformInit { seed: Some(1) }.init(zeros()).unwrap();
        let scale = (6.0f32 / 24.0).sqrt();
        assert!(t.as_slice().iter().all(|v| v.abs() <= scale));
    }

    #[test]
    fn test_zero_and_closure() {
        assert_eq!(ZeroInit.init(zeros()).unwrap(), zeros());
        let fives = |t: Tensor| -> Result<Tensor> { Ok(t.add_scalar(5.0)) };
        let out = fives.init(zeros()).unwrap();
        assert!(out.as_slice().iter().all(|&v| v == 5.0));
    }
}

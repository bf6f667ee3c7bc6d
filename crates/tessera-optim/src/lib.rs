//! Optimizers for tessera training.
//!
//! Optimizers never mutate a parameter in place: `update` returns the new
//! value and the caller stores it. Per-parameter state (velocity, moments)
//! is keyed by the parameter name handed to `update`.

use std::collections::HashMap;

use tessera_core::{Result, Tensor};

/// Optimizer trait: compute one update for a named parameter.
pub trait Optimizer {
    fn update(&mut self, key: &str, param: &Tensor, grad: &Tensor) -> Result<Tensor>;

    fn learning_rate(&self) -> f32;
}

// ── SGD ──────────────────────────────────────────────────────────────────

/// Stochastic Gradient Descent with optional momentum.
pub struct Sgd {
    lr: f32,
    momentum: f32,
    velocity: HashMap<String, Tensor>,
}

impl Sgd {
    /// Create a new SGD optimizer.
    ///
    /// - `lr`: learning rate
    /// - `momentum`: momentum factor (0.0 = no momentum)
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            velocity: HashMap::new(),
        }
    }
}

impl Optimizer for Sgd {
    fn update(&mut self, key: &str, param: &Tensor, grad: &Tensor) -> Result<Tensor> {
        if self.momentum == 0.0 {
            // p_new = p - lr * g
            return param.sub(&grad.scale(self.lr));
        }
        // v = momentum * v + g
        let v = match self.velocity.get(key) {
            Some(prev) => prev.scale(self.momentum).add(grad)?,
            None => grad.clone(),
        };
        // p_new = p - lr * v
        let p_new = param.sub(&v.scale(self.lr))?;
        self.velocity.insert(key.to_string(), v);
        Ok(p_new)
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}

// ── AdamW ────────────────────────────────────────────────────────────────

struct Moments {
    t: i32,
    m: Tensor,
    v: Tensor,
}

/// AdamW optimizer (Adam with decoupled weight decay).
pub struct AdamW {
    lr: f32,
    betas: (f32, f32),
    eps: f32,
    weight_decay: f32,
    moments: HashMap<String, Moments>,
}

impl AdamW {
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            betas: (0.9, 0.999),
            eps: 1e-8,
            weight_decay: 0.01,
            moments: HashMap::new(),
        }
    }

    pub fn betas(mut self, b1: f32, b2: f32) -> Self {
        self.betas = (b1, b2);
        self
    }

    pub fn eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    pub fn weight_decay(mut self, wd: f32) -> Self {
        self.weight_decay = wd;
        self
    }
}

impl Optimizer for AdamW {
    fn update(&mut self, key: &str, param: &Tensor, grad: &Tensor) -> Result<Tensor> {
        let (b1, b2) = self.betas;
        let state = self
            .moments
            .entry(key.to_string())
            .or_insert_with(|| Moments {
                t: 0,
                m: Tensor::zeros(param.shape()),
                v: Tensor::zeros(param.shape()),
            });
        state.t += 1;
        let bc1 = 1.0 - b1.powi(state.t);
        let bc2 = 1.0 - b2.powi(state.t);

        // m = β1 * m + (1 - β1) * g
        let m_new = state.m.scale(b1).add(&grad.scale(1.0 - b1))?;
        // v = β2 * v + (1 - β2) * g²
        let v_new = state.v.scale(b2).add(&grad.mul(grad)?.scale(1.0 - b2))?;

        let m_hat = m_new.scale(1.0 / bc1);
        let v_hat = v_new.scale(1.0 / bc2);

        // p_new = p * (1 - lr * wd) - lr * m_hat / (sqrt(v_hat) + eps)
        let denom = v_hat.sqrt().add_scalar(self.eps);
        let step = m_hat.scale(self.lr).div(&denom)?;
        let p_new = param.scale(1.0 - self.lr * self.weight_decay).sub(&step)?;

        state.m = m_new;
        state.v = v_new;
        Ok(p_new)
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Shape;

    fn t(data: &[f32]) -> Tensor {
        Tensor::from_f32(data, &Shape::new(&[data.len()])).unwrap()
    }

    #[test]
    fn test_sgd_no_momentum() {
        let mut opt = Sgd::new(0.1, 0.0);
        let p = t(&[1.0, 2.0, 3.0]);
        let g = t(&[0.5, 1.0, 1.5]);
        let new_p = opt.update("w", &p, &g).unwrap();
        // p - lr * g = [1 - 0.05, 2 - 0.1, 3 - 0.15]
        tessera_conformance::assert_allclose(new_p.as_slice(), &[0.95, 1.9, 2.85], 1e-5, 1e-5);
    }

    #[test]
    fn test_sgd_with_momentum() {
        let mut opt = Sgd::new(0.1, 0.9);
        let p = t(&[1.0, 2.0]);
        let g = t(&[1.0, 1.0]);

        // Step 1: v = g = [1,1], p = p - 0.1*v = [0.9, 1.9]
        let p1 = opt.update("w", &p, &g).unwrap();
        tessera_conformance::assert_allclose(p1.as_slice(), &[0.9, 1.9], 1e-5, 1e-5);

        // Step 2: v = 0.9*[1,1] + [1,1] = [1.9,1.9], p = [0.71, 1.71]
        let p2 = opt.update("w", &p1, &g).unwrap();
        tessera_conformance::assert_allclose(p2.as_slice(), &[0.71, 1.71], 1e-5, 1e-5);
    }

    #[test]
    fn test_sgd_momentum_is_per_key() {
        let mut opt = Sgd::new(0.1, 0.9);
        let g = t(&[1.0]);
        opt.update("a", &t(&[0.0]), &g).unwrap();
        // "b" has no velocity yet, so it takes a plain step
        let b = opt.update("b", &t(&[0.0]), &g).unwrap();
        tessera_conformance::assert_allclose(b.as_slice(), &[-0.1], 1e-6, 1e-6);
    }

    #[test]
    fn test_adamw_single_step() {
        let mut opt = AdamW::new(0.001)
            .betas(0.9, 0.999)
            .eps(1e-8)
            .weight_decay(0.01);
        let p = t(&[1.0, 2.0]);
        let g = t(&[0.1, 0.2]);

        let new_p = opt.update("w", &p, &g).unwrap();

        // m_hat = g, v_hat = g², so the step is lr * g / (|g| + eps)
        let expected_0 = 0.99999 * 1.0 - 0.001 * 0.1 / (0.01f32.sqrt() + 1e-8);
        let expected_1 = 0.99999 * 2.0 - 0.001 * 0.2 / (0.04f32.sqrt() + 1e-8);
        tessera_conformance::assert_allclose(
            new_p.as_slice(),
            &[expected_0, expected_1],
            1e-4,
            1e-4,
        );
    }

    #[test]
    fn test_adamw_two_steps() {
        let mut opt = AdamW::new(0.001).weight_decay(0.0);
        let p = t(&[1.0]);
        let g = t(&[1.0]);

        let p1 = opt.update("w", &p, &g).unwrap();
        let p2 = opt.update("w", &p1, &g).unwrap();

        let v1 = p1.as_slice()[0];
        let v2 = p2.as_slice()[0];
        assert!(v1 < 1.0, "param should decrease after step 1");
        assert!(v2 < v1, "param should decrease after step 2");
    }

    #[test]
    fn test_update_shape_mismatch() {
        let mut opt = Sgd::new(0.1, 0.0);
        assert!(opt.update("w", &t(&[1.0, 2.0]), &t(&[1.0])).is_err());
    }
}

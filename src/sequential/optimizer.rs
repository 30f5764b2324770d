use super::layer::{Layer, Param};
use super::tensor::Tensor;
use serde::{Serialize, Deserialize};

#[typetag::serde]
pub trait Optimizer: Send + Sync {
    /// Applies the gradients of the last backward pass to every parameter.
    fn step(&mut self, layers: &mut [Box<dyn Layer>]);
    fn clone_box(&self) -> Box<dyn Optimizer>;
}

fn collect_params(layers: &mut [Box<dyn Layer>]) -> Vec<Param<'_>> {
    layers.iter_mut().flat_map(|layer| layer.params_mut()).collect()
}


// SGD

#[derive(Serialize, Deserialize, Clone)]
pub struct SGD {
    learning_rate: f32
}

impl SGD {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate
        }
    }
}

#[typetag::serde]
impl Optimizer for SGD {
    fn step(&mut self, layers: &mut [Box<dyn Layer>]) {
        for param in collect_params(layers) {
            if let Some(grad) = param.grad {
                *param.value = param.value.map2(grad, |w, dw| w - self.learning_rate * dw);
            }
        }
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}


// Adam, moments are kept per parameter in layer order and saved with the model

#[derive(Serialize, Deserialize, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: u64,
    m: Vec<Tensor>,
    v: Vec<Tensor>
}

impl Adam {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-4,
            t: 0,
            m: Vec::new(),
            v: Vec::new()
        }
    }

    pub fn steps_taken(&self) -> u64 {
        self.t
    }
}

#[typetag::serde]
impl Optimizer for Adam {
    fn step(&mut self, layers: &mut [Box<dyn Layer>]) {
        let params = collect_params(layers);
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| Tensor::zeros(p.value.rows(), p.value.cols())).collect();
            self.v = self.m.clone();
        }

        self.t += 1;
        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(self.t as i32);
        let correction2 = 1.0 - b2.powi(self.t as i32);
        let step_size = self.learning_rate / correction1;
        let eps = self.eps;

        for ((param, m), v) in params.into_iter().zip(self.m.iter_mut()).zip(self.v.iter_mut()) {
            let Some(grad) = param.grad else { continue };
            *m = m.map2(grad, |m, g| b1 * m + (1.0 - b1) * g);
            *v = v.map2(grad, |v, g| b2 * v + (1.0 - b2) * g * g);

            let update = m.map2(v, |m, v| step_size * m / ((v / correction2).sqrt() + eps));
            *param.value = param.value.map2(&update, |w, u| w - u);
        }
    }

    fn clone_box(&self) -> Box<dyn Optimizer> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequential::layer::Dense;

    fn assert_vec_approx_eq(a: &[f32], b: &[f32]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5, "{} vs {}", x, y);
        }
    }

    fn dense_with_grads() -> Box<dyn Layer> {
        let mut dense = Dense::from_parts(
            Tensor::from_vec(vec![10.0, 20.0, 30.0, 40.0], 2, 2),
            Tensor::from_vec(vec![5.0, 6.0], 1, 2),
        );
        dense.d_weights = Some(Tensor::from_vec(vec![2.0, 3.0, 4.0, 5.0], 2, 2));
        dense.d_biases = Some(Tensor::from_vec(vec![0.5, 1.5], 1, 2));
        Box::new(dense)
    }

    #[test]
    fn test_sgd_optimizer_step() {
        let mut layers = vec![dense_with_grads()];
        SGD::new(0.1).step(&mut layers);

        let params = layers[0].params();
        // new_w = old_w - lr * d_w
        assert_vec_approx_eq(params[0].data(), &[9.8, 19.7, 29.6, 39.5]);
        // new_b = old_b - lr * d_b
        assert_vec_approx_eq(params[1].data(), &[4.95, 5.85]);
    }

    #[test]
    fn test_adam_first_step_moves_by_learning_rate() {
        let mut layers = vec![dense_with_grads()];
        let mut adam = Adam::new(0.01);
        adam.step(&mut layers);

        // after bias correction the first update is lr * g / (|g| + eps) ~ lr * sign(g)
        let params = layers[0].params();
        for (w, before) in params[0].data().iter().zip([10.0, 20.0, 30.0, 40.0]) {
            assert!((before - w - 0.01).abs() < 1e-3, "{} -> {}", before, w);
        }
        assert_eq!(adam.steps_taken(), 1);
        assert_eq!(adam.m.len(), 2);
    }

    #[test]
    fn test_layers_without_grads_are_untouched() {
        let mut layers: Vec<Box<dyn Layer>> = vec![Box::new(Dense::from_parts(
            Tensor::from_vec(vec![1.0, 2.0], 1, 2),
            Tensor::zeros(1, 2),
        ))];
        Adam::new(0.1).step(&mut layers);
        assert_eq!(layers[0].params()[0].data(), &[1.0, 2.0]);
    }
}

pub mod tensor;
pub mod layer;
pub mod loss;
pub mod optimizer;

use tensor::Tensor;
use layer::{Layer, Dense, ReLU};
use loss::Loss;
use optimizer::Optimizer;

use rand::Rng;
use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize)]
pub struct Sequential {
    pub layers: Vec<Box<dyn Layer>>,
    pub loss: Box<dyn Loss>,
    pub optimizer: Box<dyn Optimizer>
}

impl Sequential {
    pub fn new(layers: Vec<Box<dyn Layer>>, loss: Box<dyn Loss>, optimizer: Box<dyn Optimizer>) -> Self {
        Self {
            layers,
            loss,
            optimizer
        }
    }

    /// Dense layers of the given widths with ReLU between them and a linear
    /// output layer.
    pub fn mlp<R: Rng + ?Sized>(
        input_size: usize,
        hidden: &[usize],
        output_size: usize,
        loss: Box<dyn Loss>,
        optimizer: Box<dyn Optimizer>,
        rng: &mut R,
    ) -> Self {
        let mut layers: Vec<Box<dyn Layer>> = Vec::with_capacity(hidden.len() * 2 + 1);
        let mut width = input_size;
        for &size in hidden {
            layers.push(Box::new(Dense::new(width, size, rng)));
            layers.push(Box::new(ReLU::new()));
            width = size;
        }
        layers.push(Box::new(Dense::new(width, output_size, rng)));
        Self::new(layers, loss, optimizer)
    }

    pub fn predict(&mut self, input: &Tensor) -> Tensor {
        let mut output = input.clone();
        for layer in &mut self.layers {
            output = layer.forward(&output);
        }
        output
    }

    pub fn infer(&self, input: &Tensor) -> Tensor {
        let mut output = input.clone();
        for layer in &self.layers {
            output = layer.infer(&output);
        }
        output
    }

    /// One gradient step towards `y_batch`. Gradients are rescaled so their
    /// global norm does not exceed `max_grad_norm` before the optimizer sees
    /// them. Returns the loss before the step.
    pub fn train_on_batch(&mut self, x_batch: &Tensor, y_batch: &Tensor, max_grad_norm: Option<f32>) -> f32 {
        let y_pred = self.predict(x_batch);
        let loss = self.loss.calculate(&y_pred, y_batch);

        let mut d_output = self.loss.gradient(&y_pred, y_batch);
        for layer in self.layers.iter_mut().rev() {
            d_output = layer.backward(&d_output);
        }

        if let Some(max_norm) = max_grad_norm {
            self.clip_grad_norm(max_norm);
        }
        self.optimizer.step(&mut self.layers);

        loss
    }

    /// Returns the global gradient norm before clipping.
    pub fn clip_grad_norm(&mut self, max_norm: f32) -> f32 {
        let total: f32 = self.layers.iter_mut()
            .flat_map(|layer| layer.params_mut())
            .filter_map(|p| p.grad.map(|g| g.squared_norm()))
            .sum::<f32>()
            .sqrt();

        if total > max_norm && total > 0.0 {
            let factor = max_norm / total;
            for layer in &mut self.layers {
                for param in layer.params_mut() {
                    if let Some(grad) = param.grad {
                        grad.scale(factor);
                    }
                }
            }
        }
        total
    }

    pub fn copy_weights_from(&mut self, other: &Self) {
        for (self_layer, other_layer) in self.layers.iter_mut().zip(other.layers.iter()) {
            for (param, source) in self_layer.params_mut().into_iter().zip(other_layer.params()) {
                param.value.clone_from(source);
            }
        }
    }

    pub fn input_size(&self) -> Option<usize> {
        self.layers.iter().find_map(|layer| layer.params().first().map(|w| w.rows()))
    }

    pub fn output_size(&self) -> Option<usize> {
        self.layers.iter().rev().find_map(|layer| layer.params().first().map(|w| w.cols()))
    }
}

impl Clone for Sequential {
    fn clone(&self) -> Self {
        Self {
            layers: self.layers.iter().map(|layer| layer.clone_box()).collect(),
            loss: self.loss.clone_box(),
            optimizer: self.optimizer.clone_box()
        }
    }
}

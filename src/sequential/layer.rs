use super::tensor::Tensor;
use rand::Rng;
use serde::{Serialize, Deserialize};

/// A trainable value together with the gradient from the last backward pass.
pub struct Param<'a> {
    pub value: &'a mut Tensor,
    pub grad: Option<&'a mut Tensor>,
}

#[typetag::serde]
pub trait Layer: Send + Sync {
    /// Forward pass that remembers what backward needs.
    fn forward(&mut self, input: &Tensor) -> Tensor;
    /// Forward pass without side effects.
    fn infer(&self, input: &Tensor) -> Tensor;
    fn backward(&mut self, d_output: &Tensor) -> Tensor;

    fn params(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    fn params_mut(&mut self) -> Vec<Param<'_>> {
        Vec::new()
    }

    fn clone_box(&self) -> Box<dyn Layer>;
}


// dense layer

#[derive(Serialize, Deserialize, Clone)]
pub struct Dense {
    pub weights: Tensor,
    pub biases: Tensor,
    #[serde(skip)]
    cached_input: Option<Tensor>, // for back propagation
    #[serde(skip)]
    pub d_weights: Option<Tensor>,
    #[serde(skip)]
    pub d_biases: Option<Tensor>
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        Self::from_parts(
            Tensor::he_normal(input_size, output_size, rng),
            Tensor::zeros(1, output_size),
        )
    }

    pub fn from_parts(weights: Tensor, biases: Tensor) -> Self {
        assert_eq!(biases.shape, [1, weights.cols()], "biases must be [1, outputs]");
        Self {
            weights,
            biases,
            cached_input: None,
            d_weights: None,
            d_biases: None
        }
    }
}

#[typetag::serde]
impl Layer for Dense {
    fn forward(&mut self, input: &Tensor) -> Tensor {
        self.cached_input = Some(input.clone());
        self.infer(input)
    }

    fn infer(&self, input: &Tensor) -> Tensor {
        let mut output = input.matmul(&self.weights);
        output.add_row(&self.biases);
        output
    }

    fn backward(&mut self, d_output: &Tensor) -> Tensor {
        let cached_input = self.cached_input.as_ref().expect("complete forward pass first.");

        // dL/dW = input.T @ dL/dY
        self.d_weights = Some(cached_input.transpose().matmul(d_output));

        // dL/db = dL/dY.sum(axis=0)
        self.d_biases = Some(d_output.sum_rows());

        // dL/dX = dL/dY @ weights.T
        d_output.matmul(&self.weights.transpose())
    }

    fn params(&self) -> Vec<&Tensor> {
        vec![&self.weights, &self.biases]
    }

    fn params_mut(&mut self) -> Vec<Param<'_>> {
        vec![
            Param { value: &mut self.weights, grad: self.d_weights.as_mut() },
            Param { value: &mut self.biases, grad: self.d_biases.as_mut() },
        ]
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}


// relu layer

#[derive(Serialize, Deserialize, Clone, Default)]
pub struct ReLU {
    #[serde(skip)]
    cached_input: Option<Tensor>
}

impl ReLU {
    pub fn new() -> Self {
        Self::default()
    }
}

#[typetag::serde]
impl Layer for ReLU {
    fn forward(&mut self, input: &Tensor) -> Tensor {
        self.cached_input = Some(input.clone());
        self.infer(input)
    }

    fn infer(&self, input: &Tensor) -> Tensor {
        input.map(|x| x.max(0.0))
    }

    fn backward(&mut self, d_output: &Tensor) -> Tensor {
        let cached_input = self.cached_input.as_ref().expect("complete forward pass first.");
        cached_input.map2(d_output, |input_val, output_val| {
            if input_val > 0.0 {
                output_val
            } else {
                0.0
            }
        })
    }

    fn clone_box(&self) -> Box<dyn Layer> {
        Box::new(self.clone())
    }
}

use rand::Rng;
use serde::{Serialize, Deserialize};

use super::{AgentConfig, OptimizerKind};
use crate::sequential::Sequential;
use crate::sequential::loss::Huber;
use crate::sequential::optimizer::{Adam, Optimizer, SGD};
use crate::sequential::tensor::Tensor;

/// One regression target for the online network: move `Q(state, action)`
/// towards `target`.
#[derive(Debug, Clone, Copy)]
pub struct Sample<'a> {
    pub state: &'a [f32],
    pub action: usize,
    pub target: f32,
}

/// Everything the controller needs from an action-value approximator with a
/// lagged target copy. Calls are synchronous and run to completion.
pub trait QFunction {
    fn state_len(&self) -> usize;
    fn action_count(&self) -> usize;

    /// Per-action values from the online parameters. Does not mutate them.
    fn predict(&self, state: &[f32]) -> Vec<f32>;

    /// Per-action values from the target parameters, one row per state.
    fn predict_target(&self, states: &[&[f32]]) -> Vec<Vec<f32>>;

    /// One parameter update of the online network on the batch, with a
    /// robust loss and bounded gradient norm. Returns the loss.
    fn update(&mut self, batch: &[Sample]) -> f32;

    /// Copies the online parameters into the target parameters.
    fn sync_target(&mut self);
}

/// Online and target multilayer perceptrons trained with Huber loss.
#[derive(Clone, Serialize, Deserialize)]
pub struct QNetwork {
    online: Sequential,
    target: Sequential,
    inputs: usize,
    actions: usize,
    max_grad_norm: Option<f32>,
}

impl QNetwork {
    pub fn new<R: Rng + ?Sized>(input_size: usize, actions: usize, config: &AgentConfig, rng: &mut R) -> Self {
        let optimizer: Box<dyn Optimizer> = match config.optimizer {
            OptimizerKind::Adam => Box::new(Adam::new(config.learning_rate)),
            OptimizerKind::Sgd => Box::new(SGD::new(config.learning_rate)),
        };
        let online = Sequential::mlp(
            input_size,
            &config.hidden_layers,
            actions,
            Box::new(Huber::default()),
            optimizer,
            rng,
        );
        let target = online.clone();

        Self {
            online,
            target,
            inputs: input_size,
            actions,
            max_grad_norm: Some(config.max_grad_norm).filter(|n| *n > 0.0),
        }
    }

    pub fn online(&self) -> &Sequential {&self.online}
    pub fn target(&self) -> &Sequential {&self.target}
}

impl QFunction for QNetwork {
    fn state_len(&self) -> usize {
        self.inputs
    }

    fn action_count(&self) -> usize {
        self.actions
    }

    fn predict(&self, state: &[f32]) -> Vec<f32> {
        let input = Tensor::from_vec(state.to_vec(), 1, state.len());
        self.online.infer(&input).data().to_vec()
    }

    fn predict_target(&self, states: &[&[f32]]) -> Vec<Vec<f32>> {
        if states.is_empty() {
            return Vec::new();
        }
        let values = self.target.infer(&Tensor::from_rows(states));
        (0..values.rows()).map(|i| values.row(i).to_vec()).collect()
    }

    fn update(&mut self, batch: &[Sample]) -> f32 {
        if batch.is_empty() {
            return 0.0;
        }
        let states: Vec<&[f32]> = batch.iter().map(|s| s.state).collect();
        let states = Tensor::from_rows(&states);

        // only the taken action's column carries an error
        let mut targets = self.online.infer(&states);
        let cols = targets.cols();
        for (i, sample) in batch.iter().enumerate() {
            targets.data_mut()[i * cols + sample.action] = sample.target;
        }

        self.online.train_on_batch(&states, &targets, self.max_grad_norm)
    }

    fn sync_target(&mut self) {
        self.target.copy_weights_from(&self.online);
    }
}

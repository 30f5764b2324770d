use super::tensor::Tensor;
use serde::{Serialize, Deserialize};

#[typetag::serde]
pub trait Loss: Send + Sync {
    fn calculate(&self, y_pred: &Tensor, y_true: &Tensor) -> f32;
    fn gradient(&self, y_pred: &Tensor, y_true: &Tensor) -> Tensor;
    fn clone_box(&self) -> Box<dyn Loss>;
}


// huber (smooth l1) loss, quadratic near zero and linear beyond `delta`

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Huber {
    pub delta: f32
}

impl Huber {
    pub fn new(delta: f32) -> Self {
        Self { delta }
    }
}

impl Default for Huber {
    fn default() -> Self {
        Self::new(1.0)
    }
}

#[typetag::serde]
impl Loss for Huber {
    // summed over columns, averaged over rows
    fn calculate(&self, y_pred: &Tensor, y_true: &Tensor) -> f32 {
        let rows = y_pred.rows();
        if rows == 0 {
            return 0.0;
        }
        let delta = self.delta;
        let errors = y_pred.map2(y_true, |p, t| {
            let d = (p - t).abs();
            if d <= delta {
                0.5 * d * d
            } else {
                delta * (d - 0.5 * delta)
            }
        });
        errors.data().iter().sum::<f32>() / rows as f32
    }

    fn gradient(&self, y_pred: &Tensor, y_true: &Tensor) -> Tensor {
        let rows = y_pred.rows().max(1) as f32;
        let delta = self.delta;
        y_pred.map2(y_true, |p, t| (p - t).clamp(-delta, delta) / rows)
    }

    fn clone_box(&self) -> Box<dyn Loss> {
        Box::new(self.clone())
    }
}

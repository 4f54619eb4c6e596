use crate::{
    error::{Error, Result},
    network::{Gradient, Parameters},
};
use ndarray::{Array, Dimension, Zip};

/// Defines the strategy for updating model parameters from the gradient of one batch.
pub trait Optimizer {
    /// Updates every entry of `params` using `grad`.
    ///
    /// # Errors
    /// `ShapeMismatch` if `grad` is not shaped like `params`.
    fn update_params(&mut self, params: &mut Parameters, grad: &Gradient) -> Result<()>;
}

/// Plain stochastic gradient descent: no momentum, no weight decay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `learning_rate` - The *length* of the steps taken on `update_params`.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

impl Optimizer for GradientDescent {
    // param <- param - learning_rate * grad, for each of the four tensors.
    fn update_params(&mut self, params: &mut Parameters, grad: &Gradient) -> Result<()> {
        if params.shape() != grad.shape() {
            return Err(Error::ShapeMismatch {
                what: "gradient parameters",
                expected: params.len(),
                found: grad.len(),
            });
        }

        let lr = self.learning_rate;
        descend(&mut params.w1, &grad.w1, lr);
        descend(&mut params.b1, &grad.b1, lr);
        descend(&mut params.w2, &grad.w2, lr);
        descend(&mut params.b2, &grad.b2, lr);

        Ok(())
    }
}

fn descend<D: Dimension>(params: &mut Array<f32, D>, grad: &Array<f32, D>, lr: f32) {
    Zip::from(params).and(grad).for_each(|p, &g| *p -= lr * g);
}

use crate::error::{Error, Result};

// Hyperparameters of a single benchmark run. The defaults reproduce the reference run: plain SGD
// at 0.02 over 5 epochs with batches of 5, a 128-unit hidden layer, and evaluation in batches of
// 256.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainConfig {
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub hidden_width: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            learning_rate: 0.02,
            epochs: 5,
            batch_size: 5,
            eval_batch_size: 256,
            hidden_width: 128,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "learning rate must be a positive finite number, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidConfig("batch size must be at least 1".into()));
        }
        if self.eval_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "evaluation batch size must be at least 1".into(),
            ));
        }
        if self.hidden_width == 0 {
            return Err(Error::InvalidConfig("hidden width must be at least 1".into()));
        }

        Ok(())
    }
}

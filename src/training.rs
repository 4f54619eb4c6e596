use crate::{
    batch::BatchSampler,
    config::TrainConfig,
    error::{Error, Result},
    loss,
    mnist::{DatasetShape, MnistDataset},
    network::{Gradient, Network, NetworkShape, Parameters},
    optimizer::{GradientDescent, Optimizer},
};
use log::{debug, info};
use ndarray_rand::rand::{Rng, SeedableRng, rngs::StdRng};
use std::{
    path::Path,
    time::{Duration, Instant},
};

/// Outcome of one training epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    /// Mean per-sample loss over the epoch, each batch weighted by its size.
    pub average_loss: f64,
    pub duration: Duration,
}

/// Outcome of the evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    pub fn accuracy_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.correct as f64 / self.total as f64
    }
}

/// Everything a full benchmark run produces.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub train_samples: usize,
    pub test_samples: usize,
    pub epochs: Vec<EpochReport>,
    pub evaluation: Evaluation,
}

// Train `network` for `config.epochs` epochs. Every epoch draws a fresh shuffle of the training
// samples from `rng`, and every batch goes forward, through the loss, back, and into one optimizer
// step, in that order. `on_epoch` sees each report as soon as its epoch ends.
pub fn train<R, F>(
    network: &mut Network,
    data: &MnistDataset,
    config: &TrainConfig,
    rng: &mut R,
    mut on_epoch: F,
) -> Result<Vec<EpochReport>>
where
    R: Rng + ?Sized,
    F: FnMut(&EpochReport),
{
    config.validate()?;
    check_compatible(network, data, "training")?;

    let sampler = BatchSampler::new(data.len(), config.batch_size)?;
    let mut optimizer = GradientDescent::new(config.learning_rate);
    let mut gradient = Parameters::zeros(network.shape());
    let mut reports = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        let begin = Instant::now();
        let total_loss = train_epoch(
            network,
            data,
            &sampler,
            &mut optimizer,
            &mut gradient,
            rng,
        )?;

        let report = EpochReport {
            epoch,
            average_loss: total_loss / data.len() as f64,
            duration: begin.elapsed(),
        };
        debug!(
            "epoch {} done: average loss {}, {} batches in {:?}",
            report.epoch,
            report.average_loss,
            sampler.num_batches(),
            report.duration
        );
        on_epoch(&report);
        reports.push(report);
    }

    Ok(reports)
}

// One pass over a freshly shuffled training set. Returns the sum of (batch loss * batch size).
fn train_epoch<R, O>(
    network: &mut Network,
    data: &MnistDataset,
    sampler: &BatchSampler,
    optimizer: &mut O,
    gradient: &mut Gradient,
    rng: &mut R,
) -> Result<f64>
where
    R: Rng + ?Sized,
    O: Optimizer,
{
    let mut total_loss = 0.0;

    for batch in &sampler.shuffled(rng) {
        let (inputs, labels) = data.gather(batch);

        let activations = network.forward(inputs.view())?;
        let (batch_loss, logit_grad) =
            loss::cross_entropy_with_grad(activations.logits.view(), &labels)?;
        network.backpropagate(inputs.view(), &activations, logit_grad.view(), gradient)?;
        optimizer.update_params(network.parameters_mut(), gradient)?;

        total_loss += f64::from(batch_loss) * labels.len() as f64;
    }

    Ok(total_loss)
}

// Count how many samples of `data` the network classifies correctly, going through the dataset in
// order. Only reads the network, so no parameter can change here.
pub fn evaluate(network: &Network, data: &MnistDataset, batch_size: usize) -> Result<Evaluation> {
    check_compatible(network, data, "test")?;

    let sampler = BatchSampler::new(data.len(), batch_size)?;
    let classes = network.shape().outputs;
    let mut correct = 0;

    for batch in &sampler.sequential() {
        let (inputs, labels) = data.gather(batch);
        loss::check_labels(&labels, classes)?;

        let predictions = network.predict(inputs.view())?;
        correct += predictions
            .iter()
            .zip(&labels)
            .filter(|(predicted, label)| predicted == label)
            .count();
    }

    Ok(Evaluation {
        correct,
        total: data.len(),
    })
}

/// Loads both datasets, trains a fresh network on one and evaluates it on the other.
///
/// With `seed == None` the network is initialized and shuffled from OS entropy, so two runs differ;
/// pass a seed to make the whole run reproducible.
pub fn run<F>(
    train_path: &Path,
    test_path: &Path,
    shape: DatasetShape,
    config: &TrainConfig,
    seed: Option<u64>,
    on_epoch: F,
) -> Result<RunReport>
where
    F: FnMut(&EpochReport),
{
    config.validate()?;

    let train_data = MnistDataset::load(train_path, shape)?;
    let test_data = MnistDataset::load(test_path, shape)?;
    info!(
        "loaded {} train samples, {} test samples",
        train_data.len(),
        test_data.len()
    );

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let network_shape = NetworkShape {
        inputs: shape.pixel_count,
        hidden: config.hidden_width,
        outputs: shape.num_classes,
    };
    let mut network = Network::new(network_shape, &mut rng)?;
    info!(
        "training a {}-{}-{} network ({} parameters) for {} epochs",
        network_shape.inputs,
        network_shape.hidden,
        network_shape.outputs,
        network.parameters().len(),
        config.epochs
    );

    let epochs = train(&mut network, &train_data, config, &mut rng, on_epoch)?;
    let evaluation = evaluate(&network, &test_data, config.eval_batch_size)?;
    info!(
        "evaluated {} test samples: {} correct",
        evaluation.total, evaluation.correct
    );

    Ok(RunReport {
        train_samples: train_data.len(),
        test_samples: test_data.len(),
        epochs,
        evaluation,
    })
}

fn check_compatible(network: &Network, data: &MnistDataset, name: &str) -> Result<()> {
    if data.is_empty() {
        return Err(Error::EmptyDataset { name: name.into() });
    }

    let network_shape = network.shape();
    let data_shape = data.shape();
    if data_shape.pixel_count != network_shape.inputs {
        return Err(Error::ShapeMismatch {
            what: "pixels per sample",
            expected: network_shape.inputs,
            found: data_shape.pixel_count,
        });
    }
    if data_shape.num_classes != network_shape.outputs {
        return Err(Error::ShapeMismatch {
            what: "number of classes",
            expected: network_shape.outputs,
            found: data_shape.num_classes,
        });
    }

    Ok(())
}

//! Benchmark harness for a single-hidden-layer MNIST classifier: CSV loading, an explicit
//! forward/backward pass, plain SGD, and a timed train-then-evaluate loop.

pub mod batch;
pub mod config;
pub mod error;
pub mod loss;
pub mod mnist;
pub mod network;
pub mod optimizer;
pub mod training;

pub use config::TrainConfig;
pub use error::{Error, FormatErrorKind, Result};
pub use mnist::{DatasetShape, MnistDataset};
pub use network::{Network, NetworkShape, Parameters};
pub use training::{EpochReport, Evaluation, RunReport, evaluate, run, train};

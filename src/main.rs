use clap::Parser;
use mnist_mlp_bench::{DatasetShape, EpochReport, TrainConfig, run};
use std::{
    env,
    error::Error,
    path::{Path, PathBuf},
    process::ExitCode,
};

/// Train a 784-128-10 MNIST classifier with plain SGD on the CPU, time every epoch and report test
/// accuracy.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Training CSV (or .csv.gz). Defaults to data/mnist_train.csv next to the executable.
    #[arg(long)]
    train: Option<PathBuf>,

    /// Test CSV (or .csv.gz). Defaults to data/mnist_test.csv next to the executable.
    #[arg(long)]
    test: Option<PathBuf>,

    /// SGD step size [default: 0.02]
    #[arg(long)]
    learning_rate: Option<f32>,

    /// Number of passes over the training set [default: 5]
    #[arg(long)]
    epochs: Option<usize>,

    /// Training samples per batch [default: 5]
    #[arg(long)]
    batch_size: Option<usize>,

    /// Test samples per batch during evaluation [default: 256]
    #[arg(long)]
    eval_batch_size: Option<usize>,

    /// Units in the hidden layer [default: 128]
    #[arg(long)]
    hidden_width: Option<usize>,

    /// Seed for initialization and shuffling. Without it every run differs.
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn config(&self) -> TrainConfig {
        let defaults = TrainConfig::default();
        TrainConfig {
            learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
            epochs: self.epochs.unwrap_or(defaults.epochs),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            eval_batch_size: self.eval_batch_size.unwrap_or(defaults.eval_batch_size),
            hidden_width: self.hidden_width.unwrap_or(defaults.hidden_width),
        }
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match bench(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn bench(cli: Cli) -> Result<(), Box<dyn Error>> {
    // The datasets live in a data/ directory beside the binary unless given explicitly.
    let exe_dir = env::current_exe()?
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let data_dir = exe_dir.join("data");
    let train_path = cli
        .train
        .clone()
        .unwrap_or_else(|| data_dir.join("mnist_train.csv"));
    let test_path = cli
        .test
        .clone()
        .unwrap_or_else(|| data_dir.join("mnist_test.csv"));

    println!("Executable dir: {}", exe_dir.display());
    println!("Loading MNIST train from: {}", train_path.display());
    println!("Loading MNIST test  from: {}", test_path.display());

    let report = run(
        &train_path,
        &test_path,
        DatasetShape::MNIST,
        &cli.config(),
        cli.seed,
        print_epoch,
    )?;

    let evaluation = report.evaluation;
    println!(
        "Test accuracy: {}/{} ({:.2}%)",
        evaluation.correct,
        evaluation.total,
        evaluation.accuracy_percent()
    );

    Ok(())
}

fn print_epoch(report: &EpochReport) {
    println!(
        "Epoch {} finished. Avg loss = {} runtime epoch = {}ms",
        report.epoch,
        report.average_loss,
        report.duration.as_millis()
    );
}

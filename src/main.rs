use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use flippl::{name_analysis, optimize, ParamVector, Program, Pure};

#[derive(Parser)]
#[command(
  name = "flippl",
  about = "Sample, score, and fit coin-flip programs",
  version
)]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Draw samples from a program's output distribution
  Sample {
    /// Program source file
    program: PathBuf,
    /// Number of samples to draw
    #[arg(short, long, default_value_t = 1)]
    count: usize,
    /// JSON file of parameter values
    #[arg(long)]
    params: Option<PathBuf>,
    /// Seed for the random source
    #[arg(long)]
    seed: Option<u64>,
  },
  /// Compute the exact probability of a value
  Infer {
    /// Program source file
    program: PathBuf,
    /// Value in surface syntax, e.g. "cons true nil"
    value: String,
    /// JSON file of parameter values
    #[arg(long)]
    params: Option<PathBuf>,
  },
  /// Fit parameters to a dataset by maximum likelihood
  Learn {
    /// Program source file
    program: PathBuf,
    /// JSON dataset: {"data": ["cons true nil", ...]}
    data: PathBuf,
    #[arg(long, default_value_t = 100)]
    epochs: usize,
    #[arg(long, default_value_t = 0.01)]
    learning_rate: f64,
    /// Where to write the learned parameters (stdout if omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Seed for the random source
    #[arg(long)]
    seed: Option<u64>,
  },
}

#[derive(Deserialize)]
struct Dataset {
  data: Vec<String>,
}

fn load_program(path: &Path) -> Result<Program> {
  let src = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
  let prog = Program::parse(&src)?;
  name_analysis(&prog)?;
  Ok(prog)
}

fn load_params(path: Option<&Path>, prog: &Program) -> Result<ParamVector> {
  match path {
    Some(path) => {
      let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
      let named: BTreeMap<String, f64> = serde_json::from_str(&text)?;
      Ok(ParamVector::from_named(named))
    }
    None if prog.params().is_empty() => Ok(ParamVector::default()),
    None => Err(anyhow!("program has tunable parameters; pass --params")),
  }
}

fn rng_from(seed: Option<u64>) -> StdRng {
  match seed {
    Some(seed) => StdRng::seed_from_u64(seed),
    None => StdRng::from_entropy(),
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .init();

  let cli = Cli::parse();
  match cli.command {
    Command::Sample {
      program,
      count,
      params,
      seed,
    } => {
      let prog = load_program(&program)?;
      let params = load_params(params.as_deref(), &prog)?;
      let mut rng = rng_from(seed);
      for val in prog.sample(&params, count, &mut rng)? {
        println!("{}", val);
      }
    }
    Command::Infer {
      program,
      value,
      params,
    } => {
      let prog = load_program(&program)?;
      let params = load_params(params.as_deref(), &prog)?;
      let val = Pure::parse(&value)?;
      println!("{}", prog.infer(&params, &val)?);
    }
    Command::Learn {
      program,
      data,
      epochs,
      learning_rate,
      output,
      seed,
    } => {
      let prog = load_program(&program)?;
      let text =
        fs::read_to_string(&data).with_context(|| format!("reading {}", data.display()))?;
      let dataset: Dataset = serde_json::from_str(&text)?;
      let data = dataset
        .data
        .iter()
        .map(|s| Pure::parse(s))
        .collect::<flippl::Result<Vec<_>>>()?;
      let mut rng = rng_from(seed);
      let learned = optimize(&prog, &data, epochs, learning_rate, &mut rng)?;
      let json = serde_json::to_string_pretty(&learned.to_named())?;
      match output {
        Some(path) => {
          fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?
        }
        None => println!("{}", json),
      }
    }
  }
  Ok(())
}

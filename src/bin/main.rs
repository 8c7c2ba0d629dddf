use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use intcode::pipeline::{self, FeedbackLoop};
use intcode::{Config, InputPolicy, Program, Vm, Word};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "intcode")]
#[command(version)]
#[command(about = "Run Intcode programs", long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run a program to completion and print its outputs
  Run {
    /// Program file (comma separated integers)
    program: PathBuf,

    /// Inputs queued before the program starts
    #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true)]
    input: Vec<Word>,

    /// Overwrite a memory cell before running, as ADDRESS=VALUE
    #[arg(long, value_parser = parse_poke)]
    poke: Vec<(usize, Word)>,

    /// What to do when the program reads from an empty input queue; with
    /// `suspend` the outputs produced so far are printed and the run stops
    #[arg(long, value_enum, default_value_t = Policy::Fail)]
    input_policy: Policy,

    #[command(flatten)]
    limits: Limits,

    /// Print the final memory image after the outputs
    #[arg(long)]
    dump_memory: bool,
  },

  /// Run a chain of amplifiers and print the final signal
  Amplify {
    /// Program file (comma separated integers)
    program: PathBuf,

    /// Phase setting of each amplifier, in order
    #[arg(short, long, value_delimiter = ',', required = true, allow_hyphen_values = true)]
    phases: Vec<Word>,

    /// Signal fed to the first amplifier
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    seed: Word,

    /// Wire the last amplifier back into the first
    #[arg(long)]
    feedback: bool,

    /// Give every amplifier its own thread (implies --feedback)
    #[arg(long)]
    threaded: bool,

    #[command(flatten)]
    limits: Limits,
  },
}

#[derive(clap::Args)]
struct Limits {
  /// Abort a machine after this many instructions
  #[arg(long)]
  step_limit: Option<u64>,

  /// Largest memory a machine may grow to, in cells
  #[arg(long)]
  memory_limit: Option<usize>,
}

impl Limits {
  fn config(&self) -> Config {
    let config = Config::default().with_step_limit(self.step_limit);
    match self.memory_limit {
      Some(limit) => config.with_memory_limit(limit),
      None => config,
    }
  }
}

#[derive(Clone, Copy, ValueEnum)]
enum Policy {
  Fail,
  Suspend,
}

impl From<Policy> for InputPolicy {
  fn from(policy: Policy) -> Self {
    match policy {
      Policy::Fail => Self::Fail,
      Policy::Suspend => Self::Suspend,
    }
  }
}

fn parse_poke(text: &str) -> Result<(usize, Word), String> {
  let (address, value) = text
    .split_once('=')
    .ok_or_else(|| format!("expected ADDRESS=VALUE, got `{text}`"))?;
  let address = address
    .trim()
    .parse::<usize>()
    .map_err(|e| format!("invalid address `{address}`: {e}"))?;
  let value = value
    .trim()
    .parse::<Word>()
    .map_err(|e| format!("invalid value `{value}`: {e}"))?;
  Ok((address, value))
}

/// Use `RUST_LOG` to override the default filter.
fn init_logging() {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,intcode=info"));
  fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

fn load(path: &Path) -> Result<Program> {
  Program::load(path).with_context(|| format!("failed to load {}", path.display()))
}

fn join(words: &[Word]) -> String {
  words
    .iter()
    .map(Word::to_string)
    .collect::<Vec<_>>()
    .join(",")
}

/// Run `vm` over `input`. Under the suspend policy an empty input queue ends
/// the run early instead of failing it.
fn execute(vm: &mut Vm, input: Vec<Word>) -> Result<Vec<Word>> {
  if vm.config().input_policy != InputPolicy::Suspend {
    let outputs = vm.run_with_input(input).context("program failed")?;
    info!(steps = vm.steps(), outputs = outputs.len(), "program halted");
    return Ok(outputs);
  }
  vm.extend_input(input);
  let outputs = vm.run_until_blocked().context("program failed")?;
  if vm.is_halted() {
    info!(steps = vm.steps(), outputs = outputs.len(), "program halted");
  } else {
    warn!(ip = vm.ip(), steps = vm.steps(), "program is waiting for more input");
  }
  Ok(outputs)
}

fn main() -> Result<()> {
  init_logging();
  let cli = Cli::parse();

  match cli.command {
    Command::Run {
      program,
      input,
      poke,
      input_policy,
      limits,
      dump_memory,
    } => {
      let config = limits.config().with_input_policy(input_policy.into());
      let mut vm = Vm::with_config(&load(&program)?, config);
      for (address, value) in poke {
        vm.poke(address, value)
          .with_context(|| format!("cannot poke address {address}"))?;
      }
      let outputs = execute(&mut vm, input)?;
      println!("{}", join(&outputs));
      if dump_memory {
        println!("{}", join(vm.memory().as_slice()));
      }
    }
    Command::Amplify {
      program,
      phases,
      seed,
      feedback,
      threaded,
      limits,
    } => {
      if phases.is_empty() {
        bail!("at least one phase setting is required");
      }
      let program = load(&program)?;
      let config = limits.config();
      let signal = if threaded {
        pipeline::feedback_threaded(&program, &phases, seed, config)?
      } else if feedback {
        FeedbackLoop::new(&program, &phases, config)?.run(seed)?
      } else {
        pipeline::series(&program, &phases, seed, config)?
      };
      println!("{signal}");
    }
  }
  Ok(())
}

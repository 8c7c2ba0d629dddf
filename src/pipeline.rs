//! Amplifier pipelines: several machines running the same program, each
//! machine's outputs feeding the next machine's inputs.
//!
//! Every machine first receives its phase setting, then the signals flowing
//! through the pipeline. The machines never see each other; the drivers here
//! move single words between them.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, instrument};

use crate::config::{Config, InputPolicy};
use crate::program::Program;
use crate::vm::{self, Exit, Vm, Word};

/// How long a threaded amplifier waits for its next input before giving up
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
  #[error("a pipeline needs at least one phase setting")]
  NoPhases,

  #[error("amplifier {index} failed")]
  Machine {
    index: usize,
    #[source]
    source: vm::Error,
  },

  #[error("amplifier {index} halted without producing a signal")]
  NoOutput { index: usize },

  #[error("amplifier {index} needs input that no other amplifier will provide")]
  Starved { index: usize },

  #[error("amplifier {index} waited too long for input")]
  Stalled { index: usize },

  #[error("amplifier {index} lost its neighbour")]
  Disconnected { index: usize },

  #[error("an amplifier thread panicked")]
  WorkerPanicked,
}

/// Run one machine per phase in sequence; each runs to completion on
/// `[phase, signal]` and its last output becomes the next signal.
#[instrument(skip_all, fields(amplifiers = phases.len(), seed = seed))]
pub fn series(
  program: &Program,
  phases: &[Word],
  seed: Word,
  config: Config,
) -> Result<Word, PipelineError> {
  if phases.is_empty() {
    return Err(PipelineError::NoPhases);
  }
  let signal = phases
    .iter()
    .enumerate()
    .try_fold(seed, |signal, (index, &phase)| {
      let mut vm = Vm::with_config(program, config);
      let outputs = vm
        .run_with_input([phase, signal])
        .map_err(|source| PipelineError::Machine { index, source })?;
      outputs
        .last()
        .copied()
        .ok_or(PipelineError::NoOutput { index })
    })?;
  debug!(signal, "series finished");
  Ok(signal)
}

/// Machines wired in a ring and stepped round-robin on a single thread.
///
/// Each turn hands the current signal to one machine and runs it until it
/// emits the next signal or halts. The loop ends when the last machine
/// halts, and its last output is the result.
#[derive(Debug)]
pub struct FeedbackLoop {
  machines: Vec<Vm>,
  phases: Vec<Word>,
  // whether each machine has been given its phase yet
  primed: Vec<bool>,
}

impl FeedbackLoop {
  pub fn new(
    program: &Program,
    phases: &[Word],
    config: Config,
  ) -> Result<Self, PipelineError> {
    if phases.is_empty() {
      return Err(PipelineError::NoPhases);
    }
    Ok(Self {
      machines: phases
        .iter()
        .map(|_| Vm::with_config(program, config))
        .collect(),
      phases: phases.to_vec(),
      primed: vec![false; phases.len()],
    })
  }

  pub fn machines(&self) -> &[Vm] {
    &self.machines
  }

  #[instrument(skip(self), fields(amplifiers = self.machines.len()))]
  pub fn run(&mut self, seed: Word) -> Result<Word, PipelineError> {
    let last_index = self.machines.len() - 1;
    let mut signal = Some(seed);
    let mut last = None;
    loop {
      for (index, vm) in self.machines.iter_mut().enumerate() {
        if !self.primed[index] {
          vm.push_input(self.phases[index]);
          self.primed[index] = true;
        }
        // a halted upstream machine passes nothing on
        if let Some(value) = signal.take() {
          vm.push_input(value);
        }
        let exit = vm
          .run_until_output()
          .map_err(|source| PipelineError::Machine { index, source })?;
        match exit {
          Exit::Output(value) => {
            signal = Some(value);
            if index == last_index {
              last = Some(value);
            }
          }
          Exit::Halted if index == last_index => {
            debug!(signal = ?last, "feedback loop finished");
            return last.ok_or(PipelineError::NoOutput { index });
          }
          Exit::Halted => {}
          Exit::AwaitingInput => return Err(PipelineError::Starved { index }),
        }
      }
    }
  }
}

/// The feedback ring with every machine on its own thread.
///
/// Neighbours are connected by bounded channels, so a machine blocks until
/// its upstream neighbour has produced the value it needs. Machines run with
/// `InputPolicy::Suspend` whatever `config` says. Only words cross threads.
#[instrument(skip_all, fields(amplifiers = phases.len(), seed = seed))]
pub fn feedback_threaded(
  program: &Program,
  phases: &[Word],
  seed: Word,
  config: Config,
) -> Result<Word, PipelineError> {
  if phases.is_empty() {
    return Err(PipelineError::NoPhases);
  }
  let count = phases.len();
  let config = config.with_input_policy(InputPolicy::Suspend);
  let (senders, receivers): (Vec<Sender<Word>>, Vec<Receiver<Word>>) =
    (0..count).map(|_| bounded(count)).unzip();
  senders[0]
    .send(seed)
    .map_err(|_| PipelineError::Disconnected { index: 0 })?;

  let results = thread::scope(|scope| {
    let handles: Vec<_> = phases
      .iter()
      .zip(receivers)
      .enumerate()
      .map(|(index, (&phase, input))| {
        let mut vm = Vm::with_config(program, config);
        vm.push_input(phase);
        let output = senders[(index + 1) % count].clone();
        scope.spawn(move || drive(index, vm, input, output))
      })
      .collect();
    // only the machines may hold senders, so a halted ring disconnects
    drop(senders);
    handles
      .into_iter()
      .map(|handle| {
        handle
          .join()
          .unwrap_or_else(|_| Err(PipelineError::WorkerPanicked))
      })
      .collect::<Vec<_>>()
  });

  let mut last = None;
  let mut finished = false;
  let mut disconnected = None;
  for (index, result) in results.into_iter().enumerate() {
    match result {
      Ok(emitted) if index == count - 1 => {
        last = emitted;
        finished = true;
      }
      Ok(_) => {}
      Err(error @ PipelineError::Disconnected { .. }) => {
        disconnected.get_or_insert(error);
      }
      Err(error) => return Err(error),
    }
  }
  // once the last machine halts the ring is done, and upstream machines
  // still waiting on it are expected to lose their input
  if let Some(error) = disconnected.filter(|_| !finished) {
    return Err(error);
  }
  debug!(signal = ?last, "threaded feedback loop finished");
  last.ok_or(PipelineError::NoOutput { index: count - 1 })
}

// Runs one amplifier until it halts, returning its last output.
fn drive(
  index: usize,
  mut vm: Vm,
  input: Receiver<Word>,
  output: Sender<Word>,
) -> Result<Option<Word>, PipelineError> {
  let mut emitted = None;
  loop {
    let exit = vm
      .run_until_output()
      .map_err(|source| PipelineError::Machine { index, source })?;
    match exit {
      Exit::Output(value) => {
        emitted = Some(value);
        // a halted downstream machine drops what it is sent
        if output.send(value).is_err() {
          debug!(index, value, "downstream amplifier gone, dropping signal");
        }
      }
      Exit::AwaitingInput => {
        let value = input.recv_timeout(STALL_TIMEOUT).map_err(|error| match error {
          RecvTimeoutError::Timeout => PipelineError::Stalled { index },
          RecvTimeoutError::Disconnected => PipelineError::Disconnected { index },
        })?;
        vm.push_input(value);
      }
      Exit::Halted => {
        debug!(index, steps = vm.steps(), "amplifier halted");
        return Ok(emitted);
      }
    }
  }
}

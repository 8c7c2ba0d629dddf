use std::collections::VecDeque;
use std::str::FromStr;

use tracing::{debug, trace, warn};

use crate::config::{Config, InputPolicy};
use crate::memory::{self, Memory};
use crate::opcode::{DecodeError, Instruction, Mode, Opcode};
use crate::program::{self, Program};

/// The type of a single memory cell, input or output
pub type Word = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
  /// Built, nothing executed yet.
  Ready,
  Running,
  /// The last instruction emitted an output.
  Suspended,
  /// An input instruction found the queue empty and is waiting to re-run.
  AwaitingInput,
  Halted,
  /// An error stopped the machine; it cannot be resumed.
  Faulted,
}

/// Result of executing a single instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  Continue,
  Output(Word),
  AwaitingInput,
  Halted,
}

impl Step {
  /// Whether the machine can keep stepping without outside help
  pub fn is_running(&self) -> bool {
    matches!(self, Self::Continue | Self::Output(_))
  }

  pub fn output(&self) -> Option<Word> {
    match self {
      Self::Output(value) => Some(*value),
      _ => None,
    }
  }
}

/// Why `run_until_output` handed control back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
  Output(Word),
  AwaitingInput,
  Halted,
}

/// An Intcode machine.
///
/// The machine owns its memory, input queue and output record, so any
/// number of them can be driven side by side. Execution only ever happens
/// inside `step` and the `run*` helpers built on it; between calls the
/// instruction pointer and relative base are simply kept, which is all that
/// suspending a machine amounts to.
#[derive(Debug, Clone)]
pub struct Vm {
  ip: usize,
  relative_base: Word,
  memory: Memory,
  inputs: VecDeque<Word>,
  outputs: Vec<Word>,
  state: State,
  steps: u64,
  config: Config,
}

impl Vm {
  /// Create a machine with the default configuration
  pub fn new(program: &Program) -> Self {
    Self::with_config(program, Config::default())
  }

  pub fn with_config(program: &Program, config: Config) -> Self {
    Self {
      ip: 0,
      relative_base: 0,
      memory: Memory::with_limit(program.words().to_vec(), config.memory_limit),
      inputs: VecDeque::new(),
      outputs: Vec::new(),
      state: State::Ready,
      steps: 0,
      config,
    }
  }

  /// Execute a single instruction using the configured input policy
  pub fn step(&mut self) -> Result<Step, Error> {
    self.step_with(self.config.input_policy)
  }

  /// Run until the program halts, returning the outputs produced on the way.
  ///
  /// Needing input that is not queued is an `InputUnderflow`, whatever the
  /// input policy. Under `InputPolicy::Suspend` the machine is left resumable.
  pub fn run(&mut self) -> Result<Vec<Word>, Error> {
    let start = self.outputs.len();
    while !self.is_halted() {
      if self.step()? == Step::AwaitingInput {
        return Err(Error::InputUnderflow { ip: self.ip });
      }
    }
    Ok(self.outputs[start..].to_vec())
  }

  pub fn run_with_input<I>(&mut self, inputs: I) -> Result<Vec<Word>, Error>
  where
    I: IntoIterator<Item = Word>,
  {
    self.extend_input(inputs);
    self.run()
  }

  /// Run until the next output or halt.
  ///
  /// With `InputPolicy::Suspend` this also returns when the machine needs an
  /// input that is not queued.
  pub fn run_until_output(&mut self) -> Result<Exit, Error> {
    while !self.is_halted() {
      match self.step()? {
        Step::Continue => {}
        Step::Output(value) => return Ok(Exit::Output(value)),
        Step::AwaitingInput => return Ok(Exit::AwaitingInput),
        Step::Halted => break,
      }
    }
    Ok(Exit::Halted)
  }

  /// Consume the queued inputs and return every output produced, stopping
  /// quietly once the machine halts or needs more input.
  pub fn run_until_blocked(&mut self) -> Result<Vec<Word>, Error> {
    let start = self.outputs.len();
    while !self.is_halted() {
      if !self.step_with(InputPolicy::Suspend)?.is_running() {
        break;
      }
    }
    Ok(self.outputs[start..].to_vec())
  }

  pub fn push_input(&mut self, value: Word) {
    self.inputs.push_back(value);
  }

  pub fn extend_input<I>(&mut self, inputs: I)
  where
    I: IntoIterator<Item = Word>,
  {
    self.inputs.extend(inputs);
  }

  pub fn pending_inputs(&self) -> usize {
    self.inputs.len()
  }

  /// Every output emitted since creation or the last `take_outputs`
  pub fn outputs(&self) -> &[Word] {
    &self.outputs
  }

  pub fn take_outputs(&mut self) -> Vec<Word> {
    std::mem::take(&mut self.outputs)
  }

  /// Read a cell without growing memory; cells past the end read as zero
  pub fn peek(&self, address: usize) -> Word {
    self.memory.get(address).unwrap_or(0)
  }

  /// Overwrite a cell, growing memory if needed
  pub fn poke(&mut self, address: usize, value: Word) -> Result<(), memory::Error> {
    self.memory.write(address, value)
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn memory_mut(&mut self) -> &mut Memory {
    &mut self.memory
  }

  pub fn ip(&self) -> usize {
    self.ip
  }

  pub fn relative_base(&self) -> Word {
    self.relative_base
  }

  pub fn state(&self) -> State {
    self.state
  }

  pub fn is_halted(&self) -> bool {
    self.state == State::Halted
  }

  /// Number of instructions executed so far
  pub fn steps(&self) -> u64 {
    self.steps
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  fn step_with(&mut self, policy: InputPolicy) -> Result<Step, Error> {
    match self.state {
      State::Halted => return Err(Error::MachineHalted),
      State::Faulted => return Err(Error::MachineFaulted),
      _ => {}
    }
    if let Some(limit) = self.config.step_limit {
      if self.steps >= limit {
        return Err(self.fault(Error::StepLimitExceeded(limit)));
      }
    }

    self.state = State::Running;
    let result = Task::new(self, policy).and_then(|mut task| task.run());
    match result {
      Ok(step) => {
        self.state = match step {
          Step::Continue => State::Running,
          Step::Output(_) => State::Suspended,
          Step::AwaitingInput => State::AwaitingInput,
          Step::Halted => State::Halted,
        };
        match step {
          Step::AwaitingInput => debug!(ip = self.ip, "awaiting input"),
          Step::Halted => debug!(ip = self.ip, steps = self.steps + 1, "halted"),
          _ => {}
        }
        if step != Step::AwaitingInput {
          self.steps += 1;
        }
        Ok(step)
      }
      Err(error) => Err(self.fault(error)),
    }
  }

  fn fault(&mut self, error: Error) -> Error {
    warn!(ip = self.ip, %error, "machine faulted");
    self.state = State::Faulted;
    error
  }
}

impl FromStr for Vm {
  type Err = program::Error;

  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let program: Program = text.parse()?;
    Ok(Self::new(&program))
  }
}

/// An error that stopped execution of a machine
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
  #[error("cannot decode instruction at {ip}")]
  Decode {
    ip: usize,
    #[source]
    source: DecodeError,
  },

  #[error("input instruction at {ip} found the input queue empty")]
  InputUnderflow { ip: usize },

  #[error("instruction at {ip} produced negative address {address}")]
  NegativeAddress { ip: usize, address: Word },

  #[error("arithmetic overflow in instruction at {ip}")]
  Overflow { ip: usize },

  #[error("memory access failed in instruction at {ip}")]
  Memory {
    ip: usize,
    #[source]
    source: memory::Error,
  },

  #[error("step limit of {0} instructions exceeded")]
  StepLimitExceeded(u64),

  #[error("machine is halted")]
  MachineHalted,

  #[error("machine faulted and cannot be resumed")]
  MachineFaulted,
}

/// A single instruction being executed against a machine
struct Task<'vm> {
  vm: &'vm mut Vm,
  // pointer to the instruction word, fixed for the whole task
  ip: usize,
  instruction: Instruction,
  policy: InputPolicy,
}

impl<'vm> Task<'vm> {
  fn new(vm: &'vm mut Vm, policy: InputPolicy) -> Result<Self, Error> {
    let ip = vm.ip;
    let word = vm
      .memory
      .read(ip)
      .map_err(|source| Error::Memory { ip, source })?;
    let instruction =
      Instruction::decode(word).map_err(|source| Error::Decode { ip, source })?;
    trace!(ip, word, opcode = ?instruction.opcode, rb = vm.relative_base, "step");
    Ok(Self {
      vm,
      ip,
      instruction,
      policy,
    })
  }

  fn run(&mut self) -> Result<Step, Error> {
    match self.instruction.opcode {
      Opcode::Add => add(self),
      Opcode::Multiply => multiply(self),
      Opcode::Input => input(self),
      Opcode::Output => output(self),
      Opcode::JumpIfTrue => jump_if(self, true),
      Opcode::JumpIfFalse => jump_if(self, false),
      Opcode::LessThan => less_than(self),
      Opcode::Equals => equals(self),
      Opcode::AdjustRelativeBase => adjust_relative_base(self),
      Opcode::Halt => Ok(Step::Halted),
    }
  }

  #[inline]
  fn read(&mut self, address: usize) -> Result<Word, Error> {
    let ip = self.ip;
    self
      .vm
      .memory
      .read(address)
      .map_err(|source| Error::Memory { ip, source })
  }

  #[inline]
  fn write(&mut self, address: usize, value: Word) -> Result<(), Error> {
    let ip = self.ip;
    self
      .vm
      .memory
      .write(address, value)
      .map_err(|source| Error::Memory { ip, source })
  }

  fn address(&self, value: Word) -> Result<usize, Error> {
    usize::try_from(value).map_err(|_| Error::NegativeAddress {
      ip: self.ip,
      address: value,
    })
  }

  fn relative(&self, offset: Word) -> Result<usize, Error> {
    let address = self
      .vm
      .relative_base
      .checked_add(offset)
      .ok_or(Error::Overflow { ip: self.ip })?;
    self.address(address)
  }

  // raw value of the `n`th parameter
  fn parameter(&mut self, n: usize) -> Result<Word, Error> {
    self.read(self.ip + 1 + n)
  }

  /// Resolve the `n`th parameter to the operand it designates
  fn operand(&mut self, n: usize) -> Result<Word, Error> {
    let raw = self.parameter(n)?;
    match self.instruction.mode(n) {
      Mode::Position => {
        let address = self.address(raw)?;
        self.read(address)
      }
      Mode::Immediate => Ok(raw),
      Mode::Relative => {
        let address = self.relative(raw)?;
        self.read(address)
      }
    }
  }

  /// Resolve the `n`th parameter to a destination address
  fn target(&mut self, n: usize) -> Result<usize, Error> {
    debug_assert_eq!(self.instruction.opcode.write_target(), Some(n));
    let raw = self.parameter(n)?;
    match self.instruction.mode(n) {
      Mode::Position => self.address(raw),
      Mode::Immediate => Err(Error::Decode {
        ip: self.ip,
        source: DecodeError::ImmediateWriteTarget,
      }),
      Mode::Relative => self.relative(raw),
    }
  }

  fn overflow(&self) -> Error {
    Error::Overflow { ip: self.ip }
  }

  fn advance(&mut self) -> Step {
    self.vm.ip = self.ip + 1 + self.instruction.opcode.arity();
    Step::Continue
  }
}

// m[c] ← a + b
fn add(task: &mut Task<'_>) -> Result<Step, Error> {
  let a = task.operand(0)?;
  let b = task.operand(1)?;
  let dst = task.target(2)?;
  let sum = a.checked_add(b).ok_or_else(|| task.overflow())?;
  task.write(dst, sum)?;
  Ok(task.advance())
}

// m[c] ← a × b
fn multiply(task: &mut Task<'_>) -> Result<Step, Error> {
  let a = task.operand(0)?;
  let b = task.operand(1)?;
  let dst = task.target(2)?;
  let product = a.checked_mul(b).ok_or_else(|| task.overflow())?;
  task.write(dst, product)?;
  Ok(task.advance())
}

// m[a] ← pop(input)
fn input(task: &mut Task<'_>) -> Result<Step, Error> {
  let dst = task.target(0)?;
  if task.vm.inputs.is_empty() {
    return match task.policy {
      InputPolicy::Fail => Err(Error::InputUnderflow { ip: task.ip }),
      // nothing has happened yet, the same instruction runs again on resume
      InputPolicy::Suspend => Ok(Step::AwaitingInput),
    };
  }
  let Some(value) = task.vm.inputs.pop_front() else {
    return Err(Error::InputUnderflow { ip: task.ip });
  };
  task.write(dst, value)?;
  Ok(task.advance())
}

// out ← a
fn output(task: &mut Task<'_>) -> Result<Step, Error> {
  let value = task.operand(0)?;
  task.vm.outputs.push(value);
  task.advance();
  Ok(Step::Output(value))
}

// if (a ≠ 0) = expected : ip ← b
fn jump_if(task: &mut Task<'_>, expected: bool) -> Result<Step, Error> {
  let condition = task.operand(0)? != 0;
  let destination = task.operand(1)?;
  if condition == expected {
    let destination = task.address(destination)?;
    task.vm.ip = destination;
    Ok(Step::Continue)
  } else {
    Ok(task.advance())
  }
}

// m[c] ← a < b ? 1 : 0
fn less_than(task: &mut Task<'_>) -> Result<Step, Error> {
  let a = task.operand(0)?;
  let b = task.operand(1)?;
  let dst = task.target(2)?;
  task.write(dst, Word::from(a < b))?;
  Ok(task.advance())
}

// m[c] ← a = b ? 1 : 0
fn equals(task: &mut Task<'_>) -> Result<Step, Error> {
  let a = task.operand(0)?;
  let b = task.operand(1)?;
  let dst = task.target(2)?;
  task.write(dst, Word::from(a == b))?;
  Ok(task.advance())
}

// rb ← rb + a
fn adjust_relative_base(task: &mut Task<'_>) -> Result<Step, Error> {
  let delta = task.operand(0)?;
  let base = task
    .vm
    .relative_base
    .checked_add(delta)
    .ok_or_else(|| task.overflow())?;
  task.vm.relative_base = base;
  Ok(task.advance())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn machine(text: &str) -> Vm {
    text.parse().unwrap()
  }

  fn machine_with(text: &str, config: Config) -> Vm {
    Vm::with_config(&text.parse::<Program>().unwrap(), config)
  }

  fn suspending(text: &str) -> Vm {
    machine_with(
      text,
      Config::default().with_input_policy(InputPolicy::Suspend),
    )
  }

  const QUINE: &str = "109,1,204,-1,1001,100,1,100,1008,100,16,101,1006,101,0,99";

  // outputs 999 below 8, 1000 at 8 and 1001 above
  const COMPARE_TO_EIGHT: &str = "3,21,1008,21,8,20,1005,20,22,107,8,21,20,1006,20,31,\
    1106,0,36,98,0,0,1002,21,125,20,4,20,1105,1,46,104,999,1105,1,46,1101,\
    1000,1,20,4,20,1105,1,46,98,99";

  mod golden {
    use super::*;

    #[test]
    fn add_in_place() {
      let mut vm = machine("1,0,0,0,99");
      assert_eq!(vm.run(), Ok(vec![]));
      assert_eq!(vm.memory().as_slice(), &[2, 0, 0, 0, 99]);
      assert!(vm.is_halted());
    }

    #[test]
    fn multiply_in_place() {
      let mut vm = machine("2,4,4,5,99,0");
      vm.run().unwrap();
      assert_eq!(vm.memory().as_slice(), &[2, 4, 4, 5, 99, 9801]);
    }

    #[test]
    fn echo() {
      let mut vm = machine("3,0,4,0,99");
      assert_eq!(vm.run_with_input([42]), Ok(vec![42]));
    }

    #[test]
    fn quine() {
      let mut vm = machine(QUINE);
      let expected: Program = QUINE.parse().unwrap();
      assert_eq!(vm.run().unwrap(), expected.words());
    }

    #[test]
    fn large_product() {
      let mut vm = machine("1102,34915192,34915192,7,4,7,99,0");
      assert_eq!(vm.run(), Ok(vec![1219070632396864]));
    }

    #[test]
    fn large_immediate() {
      let mut vm = machine("104,1125899906842624,99");
      assert_eq!(vm.run(), Ok(vec![1125899906842624]));
    }

    #[test]
    fn equals_eight() {
      let program = "3,9,8,9,10,9,4,9,99,-1,8,8";
      assert_eq!(machine(program).run_with_input([8]), Ok(vec![1]));
      assert_eq!(machine(program).run_with_input([7]), Ok(vec![0]));
    }
  }

  mod step {
    use super::*;

    #[test]
    fn new() {
      let vm = machine("99");
      assert_eq!(vm.ip, 0);
      assert_eq!(vm.relative_base, 0);
      assert_eq!(vm.state, State::Ready);
      assert!(vm.outputs.is_empty());
    }

    #[test]
    fn step_add_immediate() {
      let mut vm = machine("1101,2,3,5,99");
      assert_eq!(vm.step(), Ok(Step::Continue));
      assert_eq!(vm.ip, 4);
      assert_eq!(vm.peek(5), 5);
      assert_eq!(vm.state, State::Running);
    }

    #[test]
    fn step_output_suspends() {
      let mut vm = machine("104,7,99");
      let step = vm.step().unwrap();
      assert_eq!(step, Step::Output(7));
      assert_eq!(step.output(), Some(7));
      assert!(step.is_running());
      assert_eq!(vm.state, State::Suspended);
      assert_eq!(vm.ip, 2);
    }

    #[test]
    fn step_halt_keeps_pointer() {
      let mut vm = machine("99");
      assert_eq!(vm.step(), Ok(Step::Halted));
      assert_eq!(vm.ip, 0);
      assert_eq!(vm.steps(), 1);
      assert_eq!(vm.step(), Err(Error::MachineHalted));
      assert_eq!(vm.ip, 0);
    }

    #[test]
    fn step_jump_if_true() {
      let mut vm = machine("1105,1,7,99,0,0,0,99");
      assert_eq!(vm.step(), Ok(Step::Continue));
      assert_eq!(vm.ip, 7);
      let mut vm = machine("1105,0,7,99");
      assert_eq!(vm.step(), Ok(Step::Continue));
      assert_eq!(vm.ip, 3);
    }

    #[test]
    fn step_jump_if_false() {
      let mut vm = machine("1106,0,6,99,0,0,99");
      vm.step().unwrap();
      assert_eq!(vm.ip, 6);
      let mut vm = machine("1106,5,6,99");
      vm.step().unwrap();
      assert_eq!(vm.ip, 3);
    }

    #[test]
    fn step_less_than() {
      let mut vm = machine("1107,1,2,5,99,-1");
      vm.step().unwrap();
      assert_eq!(vm.peek(5), 1);
      let mut vm = machine("1107,2,2,5,99,-1");
      vm.step().unwrap();
      assert_eq!(vm.peek(5), 0);
    }

    #[test]
    fn step_adjust_relative_base() {
      let mut vm = machine("109,19,204,-34,99");
      vm.relative_base = 2000;
      vm.poke(1985, 5).unwrap();
      assert_eq!(vm.step(), Ok(Step::Continue));
      assert_eq!(vm.relative_base, 2019);
      assert_eq!(vm.ip, 2);
      // m[2019 - 34]
      assert_eq!(vm.step(), Ok(Step::Output(5)));
    }

    #[test]
    fn relative_base_can_go_down() {
      let mut vm = machine("109,2000,109,19,99");
      vm.step().unwrap();
      vm.step().unwrap();
      assert_eq!(vm.relative_base(), 2019);
      let mut vm = machine("109,5,109,-3,99");
      vm.run().unwrap();
      assert_eq!(vm.relative_base(), 2);
    }
  }

  mod addressing {
    use super::*;

    #[test]
    fn relative_read() {
      // rb = 10, then output m[rb + 3]
      let mut vm = machine("109,10,204,3,99");
      vm.poke(13, 77).unwrap();
      assert_eq!(vm.run(), Ok(vec![77]));
    }

    #[test]
    fn relative_write() {
      // rb = 10, then m[rb - 2] ← input
      let mut vm = machine("109,10,203,-2,99");
      vm.run_with_input([5]).unwrap();
      assert_eq!(vm.peek(8), 5);
    }

    #[test]
    fn relative_write_grows_memory() {
      let mut vm = machine("109,10,203,0,204,0,99");
      assert_eq!(vm.run_with_input([7]), Ok(vec![7]));
      assert_eq!(vm.memory().len(), 11);
      assert_eq!(vm.peek(10), 7);
      assert_eq!(vm.peek(7), 0);
    }

    #[test]
    fn position_write_past_end() {
      let mut vm = machine("1101,1,2,100,99");
      vm.run().unwrap();
      assert_eq!(vm.memory().len(), 101);
      assert!(vm.memory().as_slice()[5..100].iter().all(|&cell| cell == 0));
      assert_eq!(vm.peek(100), 3);
    }

    #[test]
    fn position_read_past_end_is_zero() {
      let mut vm = machine("4,50,99");
      assert_eq!(vm.run(), Ok(vec![0]));
      assert!(vm.memory().len() >= 51);
    }

    #[test]
    fn immediate_write_target_is_rejected() {
      let mut vm = machine("11101,1,1,5,99,0");
      assert_eq!(
        vm.step(),
        Err(Error::Decode {
          ip: 0,
          source: DecodeError::ImmediateWriteTarget
        })
      );
      assert_eq!(vm.peek(5), 0);
      assert_eq!(vm.state(), State::Faulted);
    }

    #[test]
    fn immediate_input_target_is_rejected() {
      let mut vm = machine("103,0,99");
      assert!(matches!(
        vm.run_with_input([1]),
        Err(Error::Decode {
          source: DecodeError::ImmediateWriteTarget,
          ..
        })
      ));
    }

    #[test]
    fn immediate_input_target_is_rejected_before_suspending() {
      let mut vm = suspending("103,0,99");
      assert_eq!(
        vm.step(),
        Err(Error::Decode {
          ip: 0,
          source: DecodeError::ImmediateWriteTarget,
        })
      );
      assert_eq!(vm.state(), State::Faulted);
    }

    #[test]
    fn negative_address() {
      let mut vm = machine("4,-1,99");
      assert_eq!(
        vm.run(),
        Err(Error::NegativeAddress { ip: 0, address: -1 })
      );
    }
  }

  mod programs {
    use super::*;

    #[test]
    fn compare_to_eight() {
      for (input, expected) in [(5, 999), (7, 999), (8, 1000), (9, 1001), (42, 1001)] {
        let mut vm = machine(COMPARE_TO_EIGHT);
        assert_eq!(vm.run_with_input([input]), Ok(vec![expected]), "input {input}");
      }
    }

    #[test]
    fn jumps_position_mode() {
      let program = "3,12,6,12,15,1,13,14,13,4,13,99,-1,0,1,9";
      assert_eq!(machine(program).run_with_input([0]), Ok(vec![0]));
      assert_eq!(machine(program).run_with_input([3]), Ok(vec![1]));
    }

    #[test]
    fn jumps_immediate_mode() {
      let program = "3,3,1105,-1,9,1101,0,0,12,4,12,99,1";
      assert_eq!(machine(program).run_with_input([0]), Ok(vec![0]));
      assert_eq!(machine(program).run_with_input([-4]), Ok(vec![1]));
    }

    #[test]
    fn less_than_eight_position_mode() {
      let program = "3,9,7,9,10,9,4,9,99,-1,8";
      assert_eq!(machine(program).run_with_input([3]), Ok(vec![1]));
      assert_eq!(machine(program).run_with_input([8]), Ok(vec![0]));
    }

    #[test]
    fn deterministic() {
      let first = machine(COMPARE_TO_EIGHT).run_with_input([8]).unwrap();
      let second = machine(COMPARE_TO_EIGHT).run_with_input([8]).unwrap();
      assert_eq!(first, second);
      assert_eq!(machine(QUINE).run(), machine(QUINE).run());
    }
  }

  mod modes {
    use super::*;

    #[test]
    fn run_until_output_resumes() {
      let mut vm = machine(QUINE);
      let expected: Program = QUINE.parse().unwrap();
      let mut seen = Vec::new();
      while let Exit::Output(value) = vm.run_until_output().unwrap() {
        assert_eq!(vm.state(), State::Suspended);
        seen.push(value);
      }
      assert_eq!(seen, expected.words());
      assert_eq!(vm.outputs(), expected.words());
      assert_eq!(vm.run_until_output(), Ok(Exit::Halted));
    }

    #[test]
    fn run_until_output_interleaves_input() {
      // doubles every input until it reads zero
      let mut vm = machine("3,20,1006,20,14,1002,20,2,21,4,21,1105,1,0,99");
      vm.push_input(3);
      assert_eq!(vm.run_until_output(), Ok(Exit::Output(6)));
      vm.push_input(10);
      assert_eq!(vm.run_until_output(), Ok(Exit::Output(20)));
      vm.push_input(0);
      assert_eq!(vm.run_until_output(), Ok(Exit::Halted));
      assert_eq!(vm.take_outputs(), vec![6, 20]);
      assert!(vm.outputs().is_empty());
    }

    #[test]
    fn underflow_fails_by_default() {
      let mut vm = machine("3,0,99");
      assert_eq!(vm.step(), Err(Error::InputUnderflow { ip: 0 }));
      assert_eq!(vm.state(), State::Faulted);
      assert_eq!(vm.step(), Err(Error::MachineFaulted));
    }

    #[test]
    fn underflow_in_run_to_completion() {
      let mut vm = machine("3,0,3,1,99");
      assert_eq!(vm.run_with_input([1]), Err(Error::InputUnderflow { ip: 2 }));
    }

    #[test]
    fn underflow_suspends_when_asked() {
      let mut vm = suspending("3,0,4,0,99");
      assert_eq!(vm.step(), Ok(Step::AwaitingInput));
      assert_eq!(vm.state(), State::AwaitingInput);
      assert_eq!(vm.ip(), 0);
      assert_eq!(vm.steps(), 0);
      assert_eq!(vm.peek(0), 3);
      vm.push_input(9);
      assert_eq!(vm.run_until_output(), Ok(Exit::Output(9)));
      assert_eq!(vm.run_until_output(), Ok(Exit::Halted));
    }

    #[test]
    fn run_reports_underflow_but_stays_resumable_when_suspending() {
      let mut vm = suspending("3,0,4,0,99");
      assert_eq!(vm.run(), Err(Error::InputUnderflow { ip: 0 }));
      assert_eq!(vm.state(), State::AwaitingInput);
      assert_eq!(vm.run_with_input([4]), Ok(vec![4]));
    }

    #[test]
    fn run_until_output_reports_awaiting_input() {
      let mut vm = suspending("3,0,4,0,99");
      assert_eq!(vm.run_until_output(), Ok(Exit::AwaitingInput));
    }

    #[test]
    fn run_until_blocked_drains_inputs() {
      // echo until halted on a zero
      let program = "3,20,1006,20,10,4,20,1105,1,0,99";
      let mut vm = machine(program);
      vm.extend_input([1, 2, 3]);
      assert_eq!(vm.run_until_blocked(), Ok(vec![1, 2, 3]));
      assert_eq!(vm.state(), State::AwaitingInput);
      assert_eq!(vm.pending_inputs(), 0);
      vm.extend_input([4, 0]);
      assert_eq!(vm.run_until_blocked(), Ok(vec![4]));
      assert!(vm.is_halted());
      assert_eq!(vm.outputs(), &[1, 2, 3, 4]);
    }

    #[test]
    fn halted_machine_runs_to_nothing() {
      let mut vm = machine("104,1,99");
      assert_eq!(vm.run(), Ok(vec![1]));
      assert_eq!(vm.run(), Ok(vec![]));
      assert_eq!(vm.run_until_blocked(), Ok(vec![]));
      assert_eq!(vm.run_until_output(), Ok(Exit::Halted));
    }

    #[test]
    fn poke_before_running() {
      // m[0] is the first operand of an add into m[5]
      let mut vm = machine("1,0,0,5,99,0");
      vm.poke(0, 1001).unwrap();
      vm.poke(2, 7).unwrap();
      vm.run().unwrap();
      assert_eq!(vm.peek(5), 1008);
    }
  }

  mod guards {
    use super::*;

    #[test]
    fn unknown_opcode() {
      let mut vm = machine("1101,1,1,3,42");
      assert_eq!(vm.step(), Ok(Step::Continue));
      assert_eq!(
        vm.step(),
        Err(Error::Decode {
          ip: 4,
          source: DecodeError::UnknownOpcode(42)
        })
      );
      assert_eq!(vm.state(), State::Faulted);
    }

    #[test]
    fn unsupported_mode() {
      let mut vm = machine("304,0,99");
      assert_eq!(
        vm.run(),
        Err(Error::Decode {
          ip: 0,
          source: DecodeError::UnsupportedMode(3)
        })
      );
    }

    #[test]
    fn step_limit() {
      let config = Config::default().with_step_limit(10);
      // jumps to itself forever
      let mut vm = machine_with("1105,1,0", config);
      assert_eq!(vm.run(), Err(Error::StepLimitExceeded(10)));
      assert_eq!(vm.steps(), 10);
      assert_eq!(vm.state(), State::Faulted);
    }

    #[test]
    fn memory_limit() {
      let config = Config::default().with_memory_limit(64);
      let mut vm = machine_with("1101,1,1,1000,99", config);
      assert_eq!(
        vm.run(),
        Err(Error::Memory {
          ip: 0,
          source: memory::Error::OutOfBounds {
            address: 1000,
            limit: 64
          }
        })
      );
    }

    #[test]
    fn overflow() {
      let mut vm = machine("1102,9223372036854775807,2,0,99");
      assert_eq!(vm.run(), Err(Error::Overflow { ip: 0 }));
    }

    #[test]
    fn negative_jump() {
      let mut vm = machine("1105,1,-5");
      assert_eq!(
        vm.step(),
        Err(Error::NegativeAddress { ip: 0, address: -5 })
      );
    }
  }
}

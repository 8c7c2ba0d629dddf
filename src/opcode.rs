use crate::vm::Word;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
  /// Adds two operands.
  ///
  /// | Operation | Semantics     | Parameters |
  /// |-----------|---------------|------------|
  /// | Add       | `m[c] ← a + b` | `a, b, c`  |
  Add = 1,

  /// Multiplies two operands.
  ///
  /// | Operation | Semantics     | Parameters |
  /// |-----------|---------------|------------|
  /// | Multiply  | `m[c] ← a × b` | `a, b, c`  |
  Multiply = 2,

  /// Pops the front of the input queue.
  ///
  /// | Operation | Semantics          | Parameters |
  /// |-----------|--------------------|------------|
  /// | Input     | `m[a] ← pop(input)` | `a`        |
  Input = 3,

  /// | Operation | Semantics     | Parameters |
  /// |-----------|---------------|------------|
  /// | Output    | `out ← a`     | `a`        |
  Output = 4,

  /// | Operation    | Semantics              | Parameters |
  /// |--------------|------------------------|------------|
  /// | Jump If True | `if a ≠ 0 : ip ← b`    | `a, b`     |
  JumpIfTrue = 5,

  /// | Operation     | Semantics              | Parameters |
  /// |---------------|------------------------|------------|
  /// | Jump If False | `if a = 0 : ip ← b`    | `a, b`     |
  JumpIfFalse = 6,

  /// | Operation | Semantics                 | Parameters |
  /// |-----------|---------------------------|------------|
  /// | Less Than | `m[c] ← a < b ? 1 : 0`    | `a, b, c`  |
  LessThan = 7,

  /// | Operation | Semantics                 | Parameters |
  /// |-----------|---------------------------|------------|
  /// | Equals    | `m[c] ← a = b ? 1 : 0`    | `a, b, c`  |
  Equals = 8,

  /// Moves the relative base used by relative-mode parameters.
  ///
  /// | Operation            | Semantics  | Parameters |
  /// |----------------------|------------|------------|
  /// | Adjust Relative Base | `rb ← rb + a` | `a`     |
  AdjustRelativeBase = 9,

  /// | Operation | Semantics          | Parameters |
  /// |-----------|--------------------|------------|
  /// | Halt      | `(stop execution)` |            |
  Halt = 99,
}

impl Opcode {
  /// Number of parameters following the instruction word
  pub fn arity(self) -> usize {
    match self {
      Self::Add | Self::Multiply | Self::LessThan | Self::Equals => 3,
      Self::JumpIfTrue | Self::JumpIfFalse => 2,
      Self::Input | Self::Output | Self::AdjustRelativeBase => 1,
      Self::Halt => 0,
    }
  }

  /// Index of the parameter naming a destination address, if any
  pub fn write_target(self) -> Option<usize> {
    match self {
      Self::Add | Self::Multiply | Self::LessThan | Self::Equals => Some(2),
      Self::Input => Some(0),
      _ => None,
    }
  }
}

impl TryFrom<Word> for Opcode {
  type Error = DecodeError;

  fn try_from(code: Word) -> Result<Self, Self::Error> {
    match code {
      1 => Ok(Self::Add),
      2 => Ok(Self::Multiply),
      3 => Ok(Self::Input),
      4 => Ok(Self::Output),
      5 => Ok(Self::JumpIfTrue),
      6 => Ok(Self::JumpIfFalse),
      7 => Ok(Self::LessThan),
      8 => Ok(Self::Equals),
      9 => Ok(Self::AdjustRelativeBase),
      99 => Ok(Self::Halt),
      other => Err(DecodeError::UnknownOpcode(other)),
    }
  }
}

/// How a parameter is turned into an operand
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
  /// The parameter is the address of the operand.
  Position = 0,
  /// The parameter is the operand. Never valid for a destination.
  Immediate = 1,
  /// The parameter plus the relative base is the address of the operand.
  Relative = 2,
}

impl TryFrom<Word> for Mode {
  type Error = DecodeError;

  fn try_from(digit: Word) -> Result<Self, Self::Error> {
    match digit {
      0 => Ok(Self::Position),
      1 => Ok(Self::Immediate),
      2 => Ok(Self::Relative),
      other => Err(DecodeError::UnsupportedMode(other)),
    }
  }
}

/// An instruction word split into its opcode and per-parameter modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
  pub opcode: Opcode,
  pub modes: [Mode; 3],
}

impl Instruction {
  /// Split `word` into `word mod 100` and the three mode digits above it.
  ///
  /// The split truncates toward zero, so a negative word keeps its sign in
  /// the opcode field and is always an `UnknownOpcode`. `-1` is not read as
  /// `99`, and `-99` is not a halt.
  pub fn decode(word: Word) -> Result<Self, DecodeError> {
    let opcode = Opcode::try_from(word % 100)?;
    let modes = [
      Mode::try_from((word / 100) % 10)?,
      Mode::try_from((word / 1000) % 10)?,
      Mode::try_from((word / 10000) % 10)?,
    ];
    Ok(Self { opcode, modes })
  }

  /// Mode of the `n`th parameter (zero based)
  pub fn mode(&self, n: usize) -> Mode {
    self.modes[n]
  }
}

/// The instruction stream held something the machine cannot execute
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
  #[error("unknown opcode `{0}`")]
  UnknownOpcode(Word),

  #[error("unsupported addressing mode `{0}`")]
  UnsupportedMode(Word),

  #[error("immediate mode used for a write target")]
  ImmediateWriteTarget,
}

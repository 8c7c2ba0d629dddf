use crate::memory::DEFAULT_MEMORY_LIMIT;

/// What an input instruction does when the input queue is empty
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputPolicy {
  /// Fault the machine with `InputUnderflow`.
  #[default]
  Fail,
  /// Leave the instruction unexecuted and report `AwaitingInput`, so the
  /// driver can supply a value and resume.
  Suspend,
}

/// Per-machine execution settings chosen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  pub input_policy: InputPolicy,
  /// Maximum number of instructions a machine may execute over its lifetime
  pub step_limit: Option<u64>,
  /// Maximum number of memory cells
  pub memory_limit: usize,
}

impl Config {
  pub fn with_input_policy(mut self, input_policy: InputPolicy) -> Self {
    self.input_policy = input_policy;
    self
  }

  pub fn with_step_limit(mut self, step_limit: impl Into<Option<u64>>) -> Self {
    self.step_limit = step_limit.into();
    self
  }

  pub fn with_memory_limit(mut self, memory_limit: usize) -> Self {
    self.memory_limit = memory_limit;
    self
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      input_policy: InputPolicy::default(),
      step_limit: None,
      memory_limit: DEFAULT_MEMORY_LIMIT,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults() {
    let config = Config::default();
    assert_eq!(config.input_policy, InputPolicy::Fail);
    assert_eq!(config.step_limit, None);
    assert_eq!(config.memory_limit, DEFAULT_MEMORY_LIMIT);
  }

  #[test]
  fn builders() {
    let config = Config::default()
      .with_input_policy(InputPolicy::Suspend)
      .with_step_limit(100)
      .with_memory_limit(64);
    assert_eq!(config.input_policy, InputPolicy::Suspend);
    assert_eq!(config.step_limit, Some(100));
    assert_eq!(config.memory_limit, 64);
    assert_eq!(config.with_step_limit(None::<u64>).step_limit, None);
  }
}

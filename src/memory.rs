use crate::vm::Word;

/// Upper bound on the number of cells a machine may grow to by default
pub const DEFAULT_MEMORY_LIMIT: usize = 1 << 24;

/// Flat, zero-filled memory that grows on demand and never shrinks.
///
/// Reading or writing past the end first extends the buffer with zeros up to
/// and including the touched address, as long as that stays under `limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
  cells: Vec<Word>,
  limit: usize,
}

impl Memory {
  pub fn new(cells: Vec<Word>) -> Self {
    Self::with_limit(cells, DEFAULT_MEMORY_LIMIT)
  }

  /// The initial image is always accepted, even if it is larger than `limit`.
  pub fn with_limit(cells: Vec<Word>, limit: usize) -> Self {
    Self { cells, limit }
  }

  pub fn read(&mut self, address: usize) -> Result<Word, Error> {
    self.grow(address)?;
    Ok(self.cells[address])
  }

  pub fn write(&mut self, address: usize, value: Word) -> Result<(), Error> {
    self.grow(address)?;
    self.cells[address] = value;
    Ok(())
  }

  /// Look at a cell without growing; `None` past the end
  pub fn get(&self, address: usize) -> Option<Word> {
    self.cells.get(address).copied()
  }

  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  pub fn limit(&self) -> usize {
    self.limit
  }

  pub fn as_slice(&self) -> &[Word] {
    &self.cells
  }

  fn grow(&mut self, address: usize) -> Result<(), Error> {
    if address < self.cells.len() {
      return Ok(());
    }
    if address >= self.limit {
      return Err(Error::OutOfBounds {
        address,
        limit: self.limit,
      });
    }
    self.cells.resize(address + 1, 0);
    Ok(())
  }
}

impl From<Vec<Word>> for Memory {
  fn from(cells: Vec<Word>) -> Self {
    Self::new(cells)
  }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
  #[error("address {address} is beyond the memory limit of {limit} cells")]
  OutOfBounds { address: usize, limit: usize },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn write_past_end_zero_fills() {
    let mut memory = Memory::new(vec![7, 8]);
    memory.write(10, 42).unwrap();
    assert_eq!(memory.len(), 11);
    assert_eq!(memory.as_slice()[..2], [7, 8]);
    assert!(memory.as_slice()[2..10].iter().all(|&cell| cell == 0));
    assert_eq!(memory.get(10), Some(42));
  }

  #[test]
  fn read_past_end_grows() {
    let mut memory = Memory::new(vec![1]);
    assert_eq!(memory.read(4), Ok(0));
    assert_eq!(memory.len(), 5);
  }

  #[test]
  fn get_does_not_grow() {
    let memory = Memory::new(vec![1, 2, 3]);
    assert_eq!(memory.get(3), None);
    assert_eq!(memory.len(), 3);
  }

  #[test]
  fn never_shrinks() {
    let mut memory = Memory::new(vec![0; 8]);
    memory.write(2, 5).unwrap();
    memory.read(0).unwrap();
    assert_eq!(memory.len(), 8);
  }

  #[test]
  fn limit_is_enforced() {
    let mut memory = Memory::with_limit(vec![0; 4], 16);
    assert!(memory.write(15, 1).is_ok());
    assert_eq!(
      memory.write(16, 1),
      Err(Error::OutOfBounds {
        address: 16,
        limit: 16
      })
    );
    assert_eq!(memory.len(), 16);
  }
}

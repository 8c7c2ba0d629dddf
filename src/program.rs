use std::fs;
use std::num::ParseIntError;
use std::path::Path;
use std::str::FromStr;

use crate::vm::Word;

/// An Intcode program: the initial memory image of a machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
  words: Vec<Word>,
}

impl Program {
  /// Read and parse a program from a text file
  pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
    fs::read_to_string(path)?.parse()
  }

  pub fn words(&self) -> &[Word] {
    &self.words
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }
}

impl From<Vec<Word>> for Program {
  fn from(words: Vec<Word>) -> Self {
    Self { words }
  }
}

impl From<&[Word]> for Program {
  fn from(words: &[Word]) -> Self {
    Self {
      words: words.to_vec(),
    }
  }
}

impl FromStr for Program {
  type Err = Error;

  /// Comma separated decimal integers; whitespace anywhere and a single
  /// trailing comma are accepted.
  fn from_str(text: &str) -> Result<Self, Self::Err> {
    let text = text.trim();
    let text = text.strip_suffix(',').unwrap_or(text);
    if text.is_empty() {
      return Err(Error::Empty);
    }
    let words = text
      .split(',')
      .enumerate()
      .map(|(index, token)| {
        let token = token.trim();
        token.parse::<Word>().map_err(|source| Error::InvalidInteger {
          index,
          token: token.to_string(),
          source,
        })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { words })
  }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
  #[error("program text is empty")]
  Empty,

  #[error("invalid integer `{token}` at position {index}")]
  InvalidInteger {
    index: usize,
    token: String,
    #[source]
    source: ParseIntError,
  },

  #[error("could not read program")]
  Io(#[from] std::io::Error),
}

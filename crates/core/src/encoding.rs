//! Text encodings for pipeline files.
//!
//! Every file carries an encoding used whenever its buffer and text forms
//! are derived from each other. UTF-8 is the default; UTF-16LE exists
//! because toolchains on Windows keep emitting it.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// A text encoding a `File` converts through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
  #[default]
  Utf8,
  Utf16Le,
}

impl Encoding {
  /// Decode bytes into text. Invalid sequences are replaced, never fatal:
  /// a file with broken bytes still flows through the pipeline and gets a
  /// diagnostic at a higher level.
  pub fn decode(self, bytes: &[u8]) -> String {
    match self {
      Encoding::Utf8 => match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(s) => s.to_string(),
        Cow::Owned(s) => s,
      },
      Encoding::Utf16Le => {
        let units: Vec<u16> = bytes
          .chunks(2)
          .map(|pair| {
            if pair.len() == 2 {
              u16::from_le_bytes([pair[0], pair[1]])
            } else {
              u16::from(pair[0])
            }
          })
          .collect();
        String::from_utf16_lossy(&units)
      }
    }
  }

  /// Encode text into bytes.
  pub fn encode(self, text: &str) -> Vec<u8> {
    match self {
      Encoding::Utf8 => text.as_bytes().to_vec(),
      Encoding::Utf16Le => {
        let mut out = Vec::with_capacity(text.len() * 2);
        for unit in text.encode_utf16() {
          out.extend_from_slice(&unit.to_le_bytes());
        }
        out
      }
    }
  }

  /// Guess the encoding of subprocess output.
  ///
  /// Any zero byte at an odd offset marks UTF-16LE; everything else is
  /// treated as UTF-8. Only used for captured child-process output, never
  /// for file content.
  pub fn detect_subprocess_output(bytes: &[u8]) -> Encoding {
    let odd_zero = bytes
      .iter()
      .enumerate()
      .any(|(idx, byte)| idx % 2 == 1 && *byte == 0);
    if odd_zero {
      Encoding::Utf16Le
    } else {
      Encoding::Utf8
    }
  }
}

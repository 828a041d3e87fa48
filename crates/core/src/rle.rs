//! PackBits run-length coding for label bitmaps.
//!
//! Each packet starts with a signed header byte. A header `h < 0` repeats the
//! following byte `1 - h` times; `h >= 0` copies the next `h + 1` bytes verbatim.

use tracing::debug;

const MAX_RUN: usize = 128;
const MAX_LITERAL: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RleError {
    Truncated { offset: usize },
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for RleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RleError::Truncated { offset } => {
                write!(f, "run-length stream truncated at byte {offset}")
            }
            RleError::LengthMismatch { expected, actual } => write!(
                f,
                "run-length stream decodes to {actual} bytes, expected {expected}"
            ),
        }
    }
}

impl std::error::Error for RleError {}

pub fn encode_rle(data: &[u8]) -> Vec<u8> {
    let len = data.len();
    let mut out = Vec::with_capacity(len / 64 + 16);
    let mut pos = 0usize;
    while pos < len {
        let value = data[pos];
        let mut run = 1usize;
        while run < MAX_RUN && pos + run < len && data[pos + run] == value {
            run += 1;
        }
        if run > 1 {
            out.push((1 - run as i32) as i8 as u8);
            out.push(value);
            pos += run;
            continue;
        }

        let start = pos;
        let mut literal = 1usize;
        pos += 1;
        while pos < len && literal < MAX_LITERAL {
            // leave runs of three or more for a run packet
            if pos + 2 < len && data[pos] == data[pos + 1] && data[pos] == data[pos + 2] {
                break;
            }
            pos += 1;
            literal += 1;
        }
        out.push((literal - 1) as u8);
        out.extend_from_slice(&data[start..start + literal]);
    }
    debug!("packbits {} -> {} bytes", len, out.len());
    out
}

pub fn decode_rle(encoded: &[u8], expected_len: usize) -> Result<Vec<u8>, RleError> {
    let mut out = Vec::with_capacity(expected_len);
    let mut pos = 0usize;
    while pos < encoded.len() {
        let header = encoded[pos] as i8;
        pos += 1;
        if header < 0 {
            let count = (1 - header as i32) as usize;
            let Some(&value) = encoded.get(pos) else {
                return Err(RleError::Truncated { offset: pos });
            };
            pos += 1;
            out.resize(out.len() + count, value);
        } else {
            let count = header as usize + 1;
            let end = pos + count;
            if end > encoded.len() {
                return Err(RleError::Truncated {
                    offset: encoded.len(),
                });
            }
            out.extend_from_slice(&encoded[pos..end]);
            pos = end;
        }
        if out.len() > expected_len {
            return Err(RleError::LengthMismatch {
                expected: expected_len,
                actual: out.len(),
            });
        }
    }
    if out.len() != expected_len {
        return Err(RleError::LengthMismatch {
            expected: expected_len,
            actual: out.len(),
        });
    }
    Ok(out)
}

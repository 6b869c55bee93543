//! Length-prefixed `i32` array, the layout hosts use for raw int array tags.
//!
//! The prefix is the element count as a big-endian `i32`, followed by every
//! element in big-endian order.

use thiserror::Error;

/// Errors produced while decoding an int array record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    /// Fewer than four bytes were available for the length prefix.
    #[error("record is missing its length prefix")]
    MissingPrefix,
    /// The prefix encodes a negative element count.
    #[error("record declares a negative length {0}")]
    NegativeLength(i32),
    /// The payload holds fewer bytes than the prefix declares.
    #[error("record declares {declared} ints but only {available} bytes follow")]
    Truncated {
        /// Declared element count.
        declared: usize,
        /// Bytes available after the prefix.
        available: usize,
    },
    /// Bytes remain after the declared payload.
    #[error("record has {0} trailing bytes")]
    TrailingBytes(usize),
}

/// Encodes `values` with a length prefix.
#[must_use]
pub fn write_int_array(values: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + values.len() * 4);
    out.extend_from_slice(&(values.len() as i32).to_be_bytes());
    for value in values {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

/// Decodes a length-prefixed int array, rejecting partial or oversized input.
pub fn read_int_array(bytes: &[u8]) -> Result<Vec<i32>, RecordError> {
    let Some((prefix, payload)) = bytes.split_first_chunk::<4>() else {
        return Err(RecordError::MissingPrefix);
    };

    let declared = i32::from_be_bytes(*prefix);
    if declared < 0 {
        return Err(RecordError::NegativeLength(declared));
    }
    let declared = declared as usize;

    let needed = declared * 4;
    if payload.len() < needed {
        return Err(RecordError::Truncated {
            declared,
            available: payload.len(),
        });
    }
    if payload.len() > needed {
        return Err(RecordError::TrailingBytes(payload.len() - needed));
    }

    Ok(payload
        .chunks_exact(4)
        .map(|chunk| i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

use thiserror::Error;

/// Failures raised by the cursor reader and writer.
///
/// BER cannot be resynchronized after a framing error, so any of these
/// raised while decoding a protocol element is terminal for that element;
/// the reader that produced it refuses further reads.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BerError {
    /// The type byte could not be decoded at the given offset.
    #[error("malformed BER type byte at offset {0}")]
    MalformedTag(usize),
    /// A long-form length used more than four length bytes, or did not
    /// fit in memory.
    #[error("BER length overflow")]
    LengthOverflow,
    /// The element at the cursor does not carry the required tag.
    #[error("BER tag mismatch: expected 0x{expected:02x}, found 0x{found:02x}")]
    TagMismatch { expected: u8, found: u8 },
    /// The input ended inside an element.
    #[error("truncated BER element")]
    Truncated,
    /// A sequence was closed with undecoded bytes remaining inside it.
    #[error("{0} trailing bytes in BER sequence")]
    TrailingBytes(usize),
    /// An integer value does not fit the requested width.
    #[error("BER integer out of range")]
    NumericOverflow,
}

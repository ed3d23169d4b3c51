//! Step-wise BER reader with explicit sequence limits.

use crate::common::SEQUENCE_TAG;
use crate::error::BerError;

/// Cursor reader over a byte slice.
///
/// `read_start_sequence` pushes a limit at the end of the sequence value;
/// every subsequent read is bounded by the innermost limit until the
/// matching `read_end_sequence` verifies the value was consumed exactly.
///
/// A reader is one-shot. The first error is sticky: every later call
/// returns it again, so callers can use `?` freely without re-checking
/// earlier steps.
#[derive(Debug)]
pub struct BerReader<'a> {
    buf: &'a [u8],
    pos: usize,
    limits: Vec<usize>,
    failed: Option<BerError>,
}

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_ENUMERATED: u8 = 0x0A;

impl<'a> BerReader<'a> {
    pub fn new(buf: &'a [u8]) -> BerReader<'a> {
        BerReader {
            buf,
            pos: 0,
            limits: Vec::new(),
            failed: None,
        }
    }

    fn end(&self) -> usize {
        self.limits.last().copied().unwrap_or(self.buf.len())
    }

    /// Unread bytes within the innermost open sequence.
    pub fn remaining(&self) -> usize {
        self.end() - self.pos
    }

    /// The next type byte, or `None` at the end of the current scope.
    pub fn peek_tag(&self) -> Option<u8> {
        if self.pos < self.end() {
            Some(self.buf[self.pos])
        } else {
            None
        }
    }

    fn run<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, BerError>,
    ) -> Result<T, BerError> {
        if let Some(e) = &self.failed {
            return Err(e.clone());
        }
        match f(self) {
            Ok(v) => Ok(v),
            Err(e) => {
                self.failed = Some(e.clone());
                Err(e)
            }
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BerError> {
        if self.remaining() < n {
            return Err(BerError::Truncated);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_length(&mut self) -> Result<usize, BerError> {
        let first = self.take(1)?[0];
        if first < 0x80 {
            return Ok(first as usize);
        }
        let nbytes = (first & 0x7F) as usize;
        // Indefinite form and lengths wider than four octets are refused.
        if nbytes == 0 || nbytes > 4 {
            return Err(BerError::LengthOverflow);
        }
        let mut len = 0usize;
        for &b in self.take(nbytes)? {
            len = len << 8 | b as usize;
        }
        Ok(len)
    }

    /// Consume a header, check the tag, and return the value length.
    fn read_header(&mut self, expected: u8) -> Result<usize, BerError> {
        let offset = self.pos;
        let found = self.take(1)?[0];
        if found & 0x1F == 0x1F {
            // High tag number form never appears in the LDAP elements
            // this reader is used for.
            return Err(BerError::MalformedTag(offset));
        }
        if found != expected {
            return Err(BerError::TagMismatch { expected, found });
        }
        let len = self.read_length()?;
        if len > self.remaining() {
            return Err(BerError::Truncated);
        }
        Ok(len)
    }

    /// Open a constructed element, universal SEQUENCE unless `tag` says
    /// otherwise, and bound further reads to its value.
    pub fn read_start_sequence(&mut self, tag: Option<u8>) -> Result<(), BerError> {
        self.run(|r| {
            let len = r.read_header(tag.unwrap_or(SEQUENCE_TAG))?;
            r.limits.push(r.pos + len);
            Ok(())
        })
    }

    /// Close the innermost sequence, verifying exact consumption.
    pub fn read_end_sequence(&mut self) -> Result<(), BerError> {
        self.run(|r| {
            let end = match r.limits.last() {
                Some(&end) => end,
                None => return Err(BerError::Truncated),
            };
            if r.pos < end {
                return Err(BerError::TrailingBytes(end - r.pos));
            }
            r.limits.pop();
            Ok(())
        })
    }

    fn int_value(bytes: &[u8]) -> Result<i64, BerError> {
        if bytes.len() > 8 {
            return Err(BerError::NumericOverflow);
        }
        let mut val: i64 = if bytes.first().is_some_and(|b| b & 0x80 != 0) {
            -1
        } else {
            0
        };
        for &b in bytes {
            val = val << 8 | b as i64;
        }
        Ok(val)
    }

    /// Read a signed INTEGER of up to eight value octets.
    pub fn read_integer(&mut self) -> Result<i64, BerError> {
        self.run(|r| {
            let len = r.read_header(TAG_INTEGER)?;
            let bytes = r.take(len)?;
            Self::int_value(bytes)
        })
    }

    /// Read an ENUMERATED, narrowed to `i32`.
    pub fn read_enumerated(&mut self) -> Result<i32, BerError> {
        self.run(|r| {
            let len = r.read_header(TAG_ENUMERATED)?;
            let bytes = r.take(len)?;
            let wide = Self::int_value(bytes)?;
            i32::try_from(wide).map_err(|_| BerError::NumericOverflow)
        })
    }

    /// Read an OCTET STRING value.
    pub fn read_octet_string(&mut self) -> Result<Vec<u8>, BerError> {
        self.read_octet_string_tagged(TAG_OCTET_STRING)
    }

    /// Read an octet string carried under a non-universal tag.
    pub fn read_octet_string_tagged(&mut self, tag: u8) -> Result<Vec<u8>, BerError> {
        self.run(|r| {
            let len = r.read_header(tag)?;
            Ok(r.take(len)?.to_vec())
        })
    }

    /// Read a BOOLEAN; any nonzero value octet is true.
    pub fn read_boolean(&mut self) -> Result<bool, BerError> {
        self.run(|r| {
            let len = r.read_header(TAG_BOOLEAN)?;
            let bytes = r.take(len)?;
            Ok(bytes.iter().any(|&b| b != 0))
        })
    }
}

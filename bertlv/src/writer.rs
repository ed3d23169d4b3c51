//! Step-wise BER writer, symmetric to [`BerReader`](crate::reader::BerReader).

use crate::common::SEQUENCE_TAG;
use crate::error::BerError;
use crate::structures::int_payload;
use crate::write::write_length;

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_ENUMERATED: u8 = 0x0A;

/// Cursor writer producing one BER encoding.
///
/// Open sequences buffer their content so the length header can be
/// emitted in the minimal number of octets once the sequence closes.
#[derive(Debug, Default)]
pub struct BerWriter {
    root: Vec<u8>,
    open: Vec<(u8, Vec<u8>)>,
}

impl BerWriter {
    pub fn new() -> BerWriter {
        BerWriter::default()
    }

    fn out(&mut self) -> &mut Vec<u8> {
        match self.open.last_mut() {
            Some((_, buf)) => buf,
            None => &mut self.root,
        }
    }

    fn write_primitive(&mut self, tag: u8, value: &[u8]) {
        let out = self.out();
        out.push(tag);
        write_length(out, value.len());
        out.extend_from_slice(value);
    }

    /// Open a constructed element, universal SEQUENCE unless `tag` says
    /// otherwise.
    pub fn write_start_sequence(&mut self, tag: Option<u8>) {
        self.open.push((tag.unwrap_or(SEQUENCE_TAG), Vec::new()));
    }

    /// Close the innermost open sequence and emit it.
    pub fn write_end_sequence(&mut self) -> Result<(), BerError> {
        let (tag, content) = self.open.pop().ok_or(BerError::Truncated)?;
        let out = self.out();
        out.push(tag);
        write_length(out, content.len());
        out.extend(content);
        Ok(())
    }

    pub fn write_integer(&mut self, value: i64) {
        self.write_primitive(TAG_INTEGER, &int_payload(value));
    }

    pub fn write_enumerated(&mut self, value: i32) {
        self.write_primitive(TAG_ENUMERATED, &int_payload(value as i64));
    }

    pub fn write_boolean(&mut self, value: bool) {
        self.write_primitive(TAG_BOOLEAN, &[if value { 0xFF } else { 0x00 }]);
    }

    pub fn write_octet_string(&mut self, value: &[u8]) {
        self.write_primitive(TAG_OCTET_STRING, value);
    }

    /// Write an octet string under a non-universal tag.
    pub fn write_octet_string_tagged(&mut self, tag: u8, value: &[u8]) {
        self.write_primitive(tag, value);
    }

    /// Finish, failing if any sequence is still open.
    pub fn into_bytes(self) -> Result<Vec<u8>, BerError> {
        if !self.open.is_empty() {
            return Err(BerError::Truncated);
        }
        Ok(self.root)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::reader::BerReader;

    #[test]
    fn paged_value_shape() {
        let mut w = BerWriter::new();
        w.write_start_sequence(Some(0x04));
        w.write_start_sequence(None);
        w.write_integer(100);
        w.write_octet_string(b"");
        w.write_end_sequence().unwrap();
        w.write_end_sequence().unwrap();
        assert_eq!(
            w.into_bytes().unwrap(),
            vec![0x04, 0x07, 0x30, 0x05, 0x02, 0x01, 0x64, 0x04, 0x00]
        );
    }

    #[test]
    fn long_content_gets_long_form() {
        let mut w = BerWriter::new();
        w.write_start_sequence(None);
        w.write_octet_string(&[0x41; 130]);
        w.write_end_sequence().unwrap();
        let bytes = w.into_bytes().unwrap();
        assert_eq!(&bytes[..6], &[0x30, 0x81, 0x85, 0x04, 0x81, 0x82]);
        assert_eq!(bytes.len(), 136);
    }

    #[test]
    fn unbalanced_writer() {
        let mut w = BerWriter::new();
        assert_eq!(w.write_end_sequence(), Err(BerError::Truncated));
        let mut w = BerWriter::new();
        w.write_start_sequence(None);
        assert!(w.into_bytes().is_err());
    }

    #[test]
    fn reader_roundtrip() {
        let mut w = BerWriter::new();
        w.write_start_sequence(None);
        w.write_integer(-42);
        w.write_boolean(true);
        w.write_enumerated(7);
        w.write_octet_string(b"cookie");
        w.write_end_sequence().unwrap();
        let bytes = w.into_bytes().unwrap();

        let mut r = BerReader::new(&bytes);
        r.read_start_sequence(None).unwrap();
        assert_eq!(r.read_integer().unwrap(), -42);
        assert!(r.read_boolean().unwrap());
        assert_eq!(r.read_enumerated().unwrap(), 7);
        assert_eq!(r.read_octet_string().unwrap(), b"cookie");
        r.read_end_sequence().unwrap();
    }
}

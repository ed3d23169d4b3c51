//! BER encoding of complete elements.

use crate::common::{TagClass, TagStructure};
use crate::structure::{StructureTag, PL};
use bytes::BytesMut;

/// BER-encode an element tree into the provided buffer.
pub fn encode_into(buf: &mut BytesMut, tag: StructureTag) {
    let mut out = Vec::new();
    encode_inner(&mut out, tag);
    buf.extend(out);
}

fn encode_inner(buf: &mut Vec<u8>, tag: StructureTag) {
    match tag.payload {
        PL::P(v) => {
            write_type(buf, tag.class, TagStructure::Primitive, tag.id);
            write_length(buf, v.len());
            buf.extend(v);
        }
        PL::C(tags) => {
            // Constructed payloads are rendered first so the length is
            // known before the header is emitted.
            let mut inner = Vec::new();
            for tag in tags {
                encode_inner(&mut inner, tag);
            }
            write_type(buf, tag.class, TagStructure::Constructed, tag.id);
            write_length(buf, inner.len());
            buf.extend(inner);
        }
    }
}

pub(crate) fn write_type(buf: &mut Vec<u8>, class: TagClass, structure: TagStructure, id: u64) {
    let lead = (class as u8) << 6 | (structure as u8) << 5;
    if id < 31 {
        buf.push(lead | id as u8);
        return;
    }

    // High tag number form: 0x1F marker, then base-128 with the top bit
    // set on every octet but the last.
    buf.push(lead | 0x1F);
    let mut groups = Vec::new();
    let mut rem = id;
    while {
        groups.push((rem & 0x7F) as u8);
        rem >>= 7;
        rem > 0
    } {}
    while let Some(byte) = groups.pop() {
        if groups.is_empty() {
            buf.push(byte);
        } else {
            buf.push(byte | 0x80);
        }
    }
}

pub(crate) fn write_length(buf: &mut Vec<u8>, length: usize) {
    if length < 128 {
        buf.push(length as u8);
        return;
    }

    let mut count = 0u8;
    let mut rem = length;
    while {
        count += 1;
        rem >>= 8;
        rem > 0
    } {}

    buf.push(count | 0x80);
    let repr = length.to_be_bytes();
    buf.extend_from_slice(&repr[repr.len() - count as usize..]);
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use crate::common::TagClass::*;
    use crate::structures::*;

    #[test]
    fn encode_simple_tag() {
        let tag = Tag::Integer(Integer {
            inner: 1616,
            ..Default::default()
        });

        let mut buf = BytesMut::new();
        super::encode_into(&mut buf, tag.into_structure());

        assert_eq!(buf, vec![0x2, 0x2, 0x06, 0x50]);
    }

    #[test]
    fn encode_constructed_tag() {
        let tag = Tag::Sequence(Sequence {
            inner: vec![Tag::OctetString(OctetString {
                inner: b"Hello World!".to_vec(),
                ..Default::default()
            })],
            ..Default::default()
        });

        let mut buf = BytesMut::new();
        super::encode_into(&mut buf, tag.into_structure());

        assert_eq!(
            buf,
            vec![48, 14, 4, 12, 72, 101, 108, 108, 111, 32, 87, 111, 114, 108, 100, 33]
        );
    }

    #[test]
    fn encode_bind_envelope() {
        let tag = Tag::Sequence(Sequence {
            inner: vec![
                Tag::Integer(Integer {
                    inner: 1,
                    ..Default::default()
                }),
                Tag::Sequence(Sequence {
                    id: 0,
                    class: Application,
                    inner: vec![
                        Tag::Integer(Integer {
                            inner: 3,
                            ..Default::default()
                        }),
                        Tag::OctetString(OctetString {
                            inner: b"cn=root,dc=plabs".to_vec(),
                            ..Default::default()
                        }),
                        Tag::OctetString(OctetString {
                            id: 0,
                            class: Context,
                            inner: b"asdf".to_vec(),
                        }),
                    ],
                }),
            ],
            ..Default::default()
        });

        let expected = vec![
            0x30, 0x20, 0x02, 0x01, 0x01, 0x60, 0x1B, 0x02, 0x01, 0x03, 0x04, 0x10, 0x63, 0x6e,
            0x3d, 0x72, 0x6f, 0x6f, 0x74, 0x2c, 0x64, 0x63, 0x3d, 0x70, 0x6c, 0x61, 0x62, 0x73,
            0x80, 0x04, 0x61, 0x73, 0x64, 0x66,
        ];

        let mut buf = BytesMut::new();
        super::encode_into(&mut buf, tag.into_structure());

        assert_eq!(buf, expected);
    }

    #[test]
    fn roundtrip_high_tag() {
        use crate::parse::parse_tag;
        use crate::structure::{StructureTag, PL};

        let tag = StructureTag {
            class: crate::common::TagClass::Context,
            id: 1337,
            payload: PL::P(vec![0xAA]),
        };

        let mut buf = BytesMut::new();
        super::encode_into(&mut buf, tag.clone());
        assert_eq!(parse_tag(&buf), Ok((&[][..], tag)));
    }
}

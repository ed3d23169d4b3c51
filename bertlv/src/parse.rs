//! Streaming BER parser for whole elements.

use std::convert::TryFrom;

use crate::common::{TagClass, TagStructure};
use crate::structure::{StructureTag, PL};

use nom::bits::streaming as bits;
use nom::bytes::streaming::take;
use nom::combinator::map_opt;
use nom::error::{Error, ErrorKind, ParseError};
use nom::number::streaming as number;
use nom::sequence::tuple;
use nom::{IResult, InputLength, Needed};

fn class_bits(i: (&[u8], usize)) -> IResult<(&[u8], usize), TagClass> {
    map_opt(bits::take(2usize), TagClass::from_u8)(i)
}

fn pc_bit(i: (&[u8], usize)) -> IResult<(&[u8], usize), TagStructure> {
    map_opt(bits::take(1usize), TagStructure::from_u8)(i)
}

fn tagnr_bits(i: (&[u8], usize)) -> IResult<(&[u8], usize), u64> {
    bits::take(5usize)(i)
}

fn parse_type_header(i: &[u8]) -> IResult<&[u8], (TagClass, TagStructure, u64)> {
    let (i, (class, structure, id)) = nom::bits(tuple((class_bits, pc_bit, tagnr_bits)))(i)?;
    if id < 31 {
        return Ok((i, (class, structure, id)));
    }
    // High tag number form: base-128 continuation octets follow.
    let mut i = i;
    let mut id: u64 = 0;
    loop {
        let (j, byte) = number::be_u8(i)?;
        i = j;
        id = id
            .checked_shl(7)
            .map(|v| v | (byte & 0x7F) as u64)
            .ok_or_else(|| nom::Err::Failure(Error::from_error_kind(i, ErrorKind::TooLarge)))?;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok((i, (class, structure, id)))
}

fn parse_length(i: &[u8]) -> IResult<&[u8], usize> {
    let (i, len) = number::be_u8(i)?;
    if len < 128 {
        Ok((i, len as usize))
    } else {
        let len = len - 128;
        let (i, b) = take(len)(i)?;
        let (_, len) = parse_uint(b)?;
        Ok((
            i,
            usize::try_from(len)
                .map_err(|_| nom::Err::Failure(Error::from_error_kind(i, ErrorKind::TooLarge)))?,
        ))
    }
}

/// Fold big-endian octets into an unsigned integer.
pub fn parse_uint(i: &[u8]) -> IResult<&[u8], u64> {
    Ok((i, i.iter().fold(0, |res, &byte| (res << 8) | byte as u64)))
}

/// Parse one complete BER element, recursing into constructed payloads.
pub fn parse_tag(i: &[u8]) -> IResult<&[u8], StructureTag> {
    let (mut i, ((class, structure, id), len)) = tuple((parse_type_header, parse_length))(i)?;

    let payload = match structure {
        TagStructure::Primitive => {
            let (j, content) = take(len)(i)?;
            i = j;
            PL::P(content.to_vec())
        }
        TagStructure::Constructed => {
            let (j, mut content) = take(len)(i)?;
            i = j;
            let mut inner: Vec<StructureTag> = Vec::new();
            while content.input_len() > 0 {
                let (j, sub) = parse_tag(content)?;
                content = j;
                inner.push(sub);
            }
            PL::C(inner)
        }
    };

    Ok((i, StructureTag { class, id, payload }))
}

/// Stateless parser handle used by the message codec.
///
/// Reports `Incomplete` on an empty buffer so the framing layer keeps
/// waiting instead of treating it as a malformed element.
pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse<'a>(&mut self, input: &'a [u8]) -> IResult<&'a [u8], StructureTag> {
        if input.is_empty() {
            return Err(nom::Err::Incomplete(Needed::Unknown));
        }
        parse_tag(input)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn primitive() {
        let bytes: Vec<u8> = vec![2, 2, 255, 127];
        let expected = StructureTag {
            class: TagClass::Universal,
            id: 2,
            payload: PL::P(vec![255, 127]),
        };
        assert_eq!(parse_tag(&bytes), Ok((&[][..], expected)));
    }

    #[test]
    fn constructed() {
        let bytes: Vec<u8> = vec![
            48, 14, 12, 12, 72, 101, 108, 108, 111, 32, 87, 111, 114, 108, 100, 33,
        ];
        let expected = StructureTag {
            class: TagClass::Universal,
            id: 16,
            payload: PL::C(vec![StructureTag {
                class: TagClass::Universal,
                id: 12,
                payload: PL::P(b"Hello World!".to_vec()),
            }]),
        };
        assert_eq!(parse_tag(&bytes), Ok((&[][..], expected)));
    }

    #[test]
    fn long_form_length() {
        let mut bytes: Vec<u8> = vec![0x04, 0x81, 0x80];
        bytes.extend(std::iter::repeat(0x41).take(128));
        let expected = StructureTag {
            class: TagClass::Universal,
            id: 4,
            payload: PL::P(vec![0x41; 128]),
        };
        assert_eq!(parse_tag(&bytes), Ok((&[][..], expected)));
    }

    #[test]
    fn high_tag_number() {
        // Context tag 1337: 0x9F (context, primitive, 31) then base-128.
        let bytes: Vec<u8> = vec![0x9F, 0x8A, 0x39, 0x01, 0xAA];
        let expected = StructureTag {
            class: TagClass::Context,
            id: 1337,
            payload: PL::P(vec![0xAA]),
        };
        assert_eq!(parse_tag(&bytes), Ok((&[][..], expected)));
    }

    #[test]
    fn incomplete_input() {
        let bytes: Vec<u8> = vec![0x30, 0x0A, 0x02, 0x01];
        assert!(matches!(parse_tag(&bytes), Err(nom::Err::Incomplete(_))));
    }
}

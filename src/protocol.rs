use std::io;

use crate::controls::{Control, RawControl};
use crate::controls_impl::{build_tag, parse_controls};
use crate::result::Result;
use crate::search::SearchItem;
use crate::RequestId;

use bertlv::common::TagClass;
use bertlv::parse::parse_uint;
use bertlv::structure::{StructureTag, PL};
use bertlv::structures::{ASNTag, Integer, Sequence, Tag};
use bertlv::universal::Types;
use bertlv::write;

use bytes::{Buf, BytesMut};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for the RFC 4511 message envelope.
///
/// Frames are whole LDAP messages. The decoder refuses a stream whose
/// next element is not an outer universal SEQUENCE or whose declared
/// length exceeds `max_frame_size`; either condition is unrecoverable
/// in BER and tears down the connection.
pub(crate) struct LdapCodec {
    pub(crate) max_frame_size: usize,
}

pub(crate) type MaybeControls = Option<Vec<RawControl>>;
pub(crate) type ItemSender = mpsc::UnboundedSender<(SearchItem, Vec<Control>)>;
pub(crate) type ResultSender = oneshot::Sender<Result<(Tag, Vec<Control>)>>;

#[derive(Debug)]
pub enum LdapOp {
    Single,
    Search(ItemSender),
    Abandon(RequestId),
    Unbind,
}

fn proto_error(text: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, text.to_owned())
}

/// Inspect the frame header before the whole frame has arrived, so an
/// oversized or misframed message is rejected without buffering it.
fn check_frame_header(buf: &[u8], max_frame_size: usize) -> io::Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    if buf[0] != 0x30 {
        return Err(proto_error("non-SEQUENCE outer tag"));
    }
    if buf.len() < 2 {
        return Ok(());
    }
    let first = buf[1];
    let len = if first < 0x80 {
        first as usize
    } else {
        let nbytes = (first & 0x7F) as usize;
        if nbytes == 0 || nbytes > 4 {
            return Err(proto_error("malformed frame length"));
        }
        if buf.len() < 2 + nbytes {
            return Ok(());
        }
        buf[2..2 + nbytes]
            .iter()
            .fold(0usize, |len, &b| len << 8 | b as usize)
    };
    if len > max_frame_size {
        return Err(proto_error("frame exceeds maximum message size"));
    }
    Ok(())
}

#[allow(clippy::type_complexity)]
fn decode_inner(buf: &mut BytesMut) -> io::Result<Option<(RequestId, Result<(Tag, Vec<Control>)>)>> {
    let mut parser = bertlv::parse::Parser::new();
    let (i, tag) = match parser.parse(buf) {
        Err(e) if e.is_incomplete() => return Ok(None),
        Err(_) => return Err(proto_error("decoding error")),
        Ok((i, tag)) => (i, tag),
    };
    buf.advance(buf.len() - i.len());
    let mut tags = tag
        .match_class(TagClass::Universal)
        .and_then(|t| t.match_id(Types::Sequence as u64))
        .and_then(|t| t.expect_constructed())
        .ok_or_else(|| proto_error("envelope is not a sequence"))?;
    let mut maybe_controls = tags.pop().ok_or_else(|| proto_error("empty envelope"))?;
    let has_controls = match maybe_controls {
        StructureTag {
            id,
            class,
            ref payload,
        } if class == TagClass::Context && id == 0 => match *payload {
            PL::C(_) => true,
            PL::P(_) => return Err(proto_error("malformed controls")),
        },
        StructureTag { id, class, .. } if class == TagClass::Context && id == 10 => {
            // Active Directory bug workaround
            //
            // AD incorrectly encodes Notice of Disconnection messages. The OID of the
            // Unsolicited Notification should be part of the ExtendedResponse sequence
            // but AD puts it outside, where the optional controls belong. This confuses
            // our parser, which doesn't expect the extra sequence element at the end
            // and crashes. This match arm thus ignores the element.
            maybe_controls = tags.pop().ok_or_else(|| proto_error("empty envelope"))?;
            false
        }
        _ => false,
    };
    let (protoop, controls) = if has_controls {
        let protoop = tags.pop().ok_or_else(|| proto_error("missing protocol op"))?;
        (protoop, Some(maybe_controls))
    } else {
        (maybe_controls, None)
    };
    let msgid_octets = tags
        .pop()
        .and_then(|t| t.match_class(TagClass::Universal))
        .and_then(|t| t.match_id(Types::Integer as u64))
        .and_then(|t| t.expect_primitive())
        .ok_or_else(|| proto_error("missing message id"))?;
    let msgid = match parse_uint(msgid_octets.as_slice()) {
        Ok((_, id)) => id as i32,
        _ => return Err(proto_error("malformed message id")),
    };
    // A control parsing failure concerns a single operation, which is now
    // identified; report it against the message id instead of poisoning
    // the whole stream.
    let controls = match controls {
        Some(controls) => match parse_controls(controls) {
            Ok(controls) => controls,
            Err(e) => return Ok(Some((msgid, Err(e)))),
        },
        None => vec![],
    };
    Ok(Some((msgid, Ok((Tag::StructureTag(protoop), controls)))))
}

impl Decoder for LdapCodec {
    type Item = (RequestId, Result<(Tag, Vec<Control>)>);
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Self::Item>> {
        check_frame_header(buf, self.max_frame_size)?;
        decode_inner(buf)
    }
}

impl Encoder<(RequestId, Tag, MaybeControls)> for LdapCodec {
    type Error = io::Error;

    fn encode(&mut self, msg: (RequestId, Tag, MaybeControls), into: &mut BytesMut) -> io::Result<()> {
        let (id, tag, controls) = msg;
        let outstruct = {
            let mut msg = vec![
                Tag::Integer(Integer {
                    inner: id as i64,
                    ..Default::default()
                }),
                tag,
            ];
            if let Some(controls) = controls {
                msg.push(Tag::StructureTag(StructureTag {
                    id: 0,
                    class: TagClass::Context,
                    payload: PL::C(controls.into_iter().map(build_tag).collect()),
                }));
            }
            Tag::Sequence(Sequence {
                inner: msg,
                ..Default::default()
            })
            .into_structure()
        };
        write::encode_into(into, outstruct);
        Ok(())
    }
}

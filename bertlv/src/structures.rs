//! Typed builders for the ASN.1 values LDAP uses.
//!
//! Each builder knows how to render its payload; class and tag number are
//! encoded uniformly once the value has been lowered to a
//! [`StructureTag`].

use crate::common::TagClass;
use crate::structure::{StructureTag, PL};
use crate::universal::Types;

/// Lowering of a typed value into the serializable form.
pub trait ASNTag {
    fn into_structure(self) -> StructureTag;
}

/// The ASN.1 types needed to express LDAP protocol ops.
#[derive(Clone, Debug, PartialEq)]
pub enum Tag {
    Integer(Integer),
    Enumerated(Enumerated),
    Sequence(Sequence),
    Set(Set),
    OctetString(OctetString),
    Boolean(Boolean),
    Null(Null),
    /// LDAP tags implicitly; explicit tagging appears only in embedded
    /// foreign structures.
    ExplicitTag(ExplicitTag),
    /// An already-lowered value, passed through unchanged.
    StructureTag(StructureTag),
}

impl ASNTag for Tag {
    fn into_structure(self) -> StructureTag {
        match self {
            Tag::Integer(i) => i.into_structure(),
            Tag::Enumerated(i) => i.into_structure(),
            Tag::Sequence(i) => i.into_structure(),
            Tag::Set(i) => i.into_structure(),
            Tag::OctetString(i) => i.into_structure(),
            Tag::Boolean(i) => i.into_structure(),
            Tag::Null(i) => i.into_structure(),
            Tag::ExplicitTag(i) => i.into_structure(),
            Tag::StructureTag(s) => s,
        }
    }
}

/// Integer value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Integer {
    pub id: u64,
    pub class: TagClass,
    pub inner: i64,
}

/// Integer carrying the ENUMERATED tag.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Enumerated {
    pub id: u64,
    pub class: TagClass,
    pub inner: i64,
}

/// Minimal two's-complement rendering shared by Integer and Enumerated.
///
/// Leading octets are dropped while they are pure sign extension; the
/// retained leading octet keeps the correct sign bit, so 128 encodes as
/// `00 80` and -129 as `FF 7F`.
pub(crate) fn int_payload(inner: i64) -> Vec<u8> {
    let repr = inner.to_be_bytes();
    let mut skip = 0;
    while skip < repr.len() - 1 {
        let cur = repr[skip];
        let next_high = repr[skip + 1] & 0x80;
        let redundant = (cur == 0x00 && next_high == 0) || (cur == 0xFF && next_high != 0);
        if !redundant {
            break;
        }
        skip += 1;
    }
    repr[skip..].to_vec()
}

impl ASNTag for Integer {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::P(int_payload(self.inner)),
        }
    }
}

impl ASNTag for Enumerated {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::P(int_payload(self.inner)),
        }
    }
}

impl Default for Integer {
    fn default() -> Integer {
        Integer {
            id: Types::Integer as u64,
            class: TagClass::Universal,
            inner: 0,
        }
    }
}

impl Default for Enumerated {
    fn default() -> Enumerated {
        Enumerated {
            id: Types::Enumerated as u64,
            class: TagClass::Universal,
            inner: 0,
        }
    }
}

/// String of bytes.
#[derive(Clone, Debug, PartialEq)]
pub struct OctetString {
    pub id: u64,
    pub class: TagClass,
    pub inner: Vec<u8>,
}

impl ASNTag for OctetString {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::P(self.inner),
        }
    }
}

impl Default for OctetString {
    fn default() -> Self {
        OctetString {
            id: Types::OctetString as u64,
            class: TagClass::Universal,
            inner: Vec::new(),
        }
    }
}

/// Boolean value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Boolean {
    pub id: u64,
    pub class: TagClass,
    pub inner: bool,
}

impl ASNTag for Boolean {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::P(if self.inner { vec![0xFF] } else { vec![0x00] }),
        }
    }
}

impl Default for Boolean {
    fn default() -> Self {
        Boolean {
            id: Types::Boolean as u64,
            class: TagClass::Universal,
            inner: false,
        }
    }
}

/// Null value.
#[derive(Clone, Debug, PartialEq)]
pub struct Null {
    pub id: u64,
    pub class: TagClass,
}

impl ASNTag for Null {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::P(Vec::new()),
        }
    }
}

impl Default for Null {
    fn default() -> Self {
        Null {
            id: Types::Null as u64,
            class: TagClass::Universal,
        }
    }
}

/// Sequence of values.
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence {
    pub id: u64,
    pub class: TagClass,
    pub inner: Vec<Tag>,
}

impl ASNTag for Sequence {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::C(self.inner.into_iter().map(|x| x.into_structure()).collect()),
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Sequence {
            id: Types::Sequence as u64,
            class: TagClass::Universal,
            inner: Vec::new(),
        }
    }
}

/// Set of values.
#[derive(Clone, Debug, PartialEq)]
pub struct Set {
    pub id: u64,
    pub class: TagClass,
    pub inner: Vec<Tag>,
}

impl ASNTag for Set {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::C(self.inner.into_iter().map(|x| x.into_structure()).collect()),
        }
    }
}

impl Default for Set {
    fn default() -> Self {
        Set {
            id: Types::Set as u64,
            class: TagClass::Universal,
            inner: Vec::new(),
        }
    }
}

/// Explicitly tagged value.
// No Default: an explicit tag without a chosen id makes no sense.
#[derive(Clone, Debug, PartialEq)]
pub struct ExplicitTag {
    pub id: u64,
    pub class: TagClass,
    pub inner: Box<Tag>,
}

impl ASNTag for ExplicitTag {
    fn into_structure(self) -> StructureTag {
        StructureTag {
            id: self.id,
            class: self.class,
            payload: PL::C(vec![self.inner.into_structure()]),
        }
    }
}

#[cfg(test)]
mod test {
    use super::int_payload;

    #[test]
    fn int_minimal_octets() {
        // 127 fits one signed octet
        assert_eq!(int_payload(127), vec![127]);
    }

    #[test]
    fn int_sign_octet_added() {
        // 128 does not: without the pad it would read back as -128
        assert_eq!(int_payload(128), vec![0, 128]);
    }

    #[test]
    fn int_multi_octet() {
        assert_eq!(int_payload(1616), vec![0x06, 0x50]);
    }

    #[test]
    fn int_negative() {
        assert_eq!(int_payload(-1), vec![0xFF]);
        assert_eq!(int_payload(-129), vec![0xFF, 0x7F]);
    }

    #[test]
    fn int_zero() {
        assert_eq!(int_payload(0), vec![0x00]);
    }
}

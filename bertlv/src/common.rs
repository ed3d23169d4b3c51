//! Bit fields of the BER type byte.

/// Composed type byte of a universal constructed SEQUENCE.
pub const SEQUENCE_TAG: u8 = 0x30;

/// Tag class, the top two bits of the type byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum TagClass {
    Universal = 0,
    Application = 1,
    Context = 2,
    Private = 3,
}

impl TagClass {
    pub fn from_u8(v: u8) -> Option<TagClass> {
        match v {
            0 => Some(TagClass::Universal),
            1 => Some(TagClass::Application),
            2 => Some(TagClass::Context),
            3 => Some(TagClass::Private),
            _ => None,
        }
    }
}

/// Primitive/constructed flag, bit 6 of the type byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum TagStructure {
    Primitive = 0,
    Constructed = 1,
}

impl TagStructure {
    pub fn from_u8(v: u8) -> Option<TagStructure> {
        match v {
            0 => Some(TagStructure::Primitive),
            1 => Some(TagStructure::Constructed),
            _ => None,
        }
    }
}

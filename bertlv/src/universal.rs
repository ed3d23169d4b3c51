//! Universal class tag numbers used by LDAP.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u64)]
pub enum Types {
    EndOfContent = 0,
    Boolean = 1,
    Integer = 2,
    BitString = 3,
    OctetString = 4,
    Null = 5,
    ObjectIdentifier = 6,
    Enumerated = 10,
    Utf8String = 12,
    Sequence = 16,
    Set = 17,
}

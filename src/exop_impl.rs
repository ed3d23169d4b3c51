use bertlv::common::TagClass;
use bertlv::structures::{OctetString, Tag};

use crate::result::Result;

mod whoami;
pub use self::whoami::{WhoAmI, WhoAmIResp};

/// Generic extended operation.
///
/// Since the same struct can be used both for requests and responses,
/// both fields are declared as optional; when sending an extended
/// request, `name` must be set.
#[derive(Clone, Debug)]
pub struct Exop {
    /// OID of the operation. It may be absent in the response.
    pub name: Option<String>,
    /// Request or response value. It may be absent in both cases.
    pub val: Option<Vec<u8>>,
}

/// Conversion trait for extended response values.
///
/// An absent response value decodes as an empty octet string, which
/// several operations use to mean an empty result.
pub trait ExopParser: Sized {
    /// Convert the raw BER value into an exop-specific struct.
    fn parse(val: &[u8]) -> Result<Self>;
}

impl Exop {
    /// Parse the generic response into an exop-specific struct.
    pub fn parse<T: ExopParser>(&self) -> Result<T> {
        T::parse(self.val.as_deref().unwrap_or(&[]))
    }
}

pub(crate) fn construct_exop(exop: Exop) -> Vec<Tag> {
    let mut seq = Vec::new();
    if let Some(name) = exop.name {
        seq.push(Tag::OctetString(OctetString {
            id: 0,
            class: TagClass::Context,
            inner: name.into_bytes(),
        }));
    }
    if let Some(val) = exop.val {
        seq.push(Tag::OctetString(OctetString {
            id: 1,
            class: TagClass::Context,
            inner: val,
        }));
    }
    seq
}

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::result::{LdapError, Result};

use bertlv::structure::{StructureTag, PL};
use bertlv::structures::{ASNTag, Boolean, OctetString, Sequence, Tag};
use bertlv::universal::Types;
use bertlv::BerError;

/// Recognized control types.
///
/// The variants can't be exhaustively matched, since the list of
/// recognized and internally implemented controls can change from one
/// release to the next.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlType {
    PagedResults,
    ManageDsaIt,
}

mod manage_dsa_it;
pub use self::manage_dsa_it::ManageDsaIt;

mod paged_results;
pub use self::paged_results::PagedResults;

#[rustfmt::skip]
static CONTROLS: LazyLock<HashMap<&'static str, ControlType>> = LazyLock::new(|| {
    HashMap::from([
        (self::paged_results::PAGED_RESULTS_OID, ControlType::PagedResults),
        (self::manage_dsa_it::MANAGE_DSA_IT_OID, ControlType::ManageDsaIt),
    ])
});

/// Conversion trait for single control instances.
///
/// The [`Ldap::with_controls()`](crate::Ldap::with_controls) method and its sync counterpart
/// accept a vector of controls, as dictated by the LDAP specification. However, it's expected
/// that most uses of controls involve a single instance, so constructing a vector at the call
/// site is noisy. If a control implements this trait, its single instance may be used
/// in the call, and a single-element vector is constructed internally.
pub trait IntoRawControlVec {
    /// Create a control vector.
    fn into(self) -> Vec<RawControl>;
}

/// Trivial implementation for a control vector, returning itself.
impl IntoRawControlVec for Vec<RawControl> {
    fn into(self) -> Vec<RawControl> {
        self
    }
}

/// Blanket implementation for any control. The vector is constructed by the conversion
/// method.
impl<R> IntoRawControlVec for R
where
    RawControl: From<R>,
{
    fn into(self) -> Vec<RawControl> {
        vec![std::convert::Into::into(self)]
    }
}

/// Mark a control as critical.
///
/// Most controls provided by this library implement this trait. All controls
/// are instantiated as non-critical by default, unless dictated otherwise by
/// their specification.
pub trait MakeCritical {
    /// Mark the control instance as critical. This operation consumes the control,
    /// and is irreversible.
    fn critical(self) -> CriticalControl<Self>
    where
        Self: Sized,
    {
        CriticalControl { control: self }
    }
}

/// Wrapper for a control marked as critical.
///
/// The wrapper ensures that the criticality of the control will be set to
/// true when the control is encoded.
pub struct CriticalControl<T> {
    control: T,
}

impl<T> From<CriticalControl<T>> for RawControl
where
    T: Into<RawControl>,
{
    fn from(cc: CriticalControl<T>) -> RawControl {
        let mut rc = cc.control.into();
        rc.crit = true;
        rc
    }
}

/// Conversion trait for response controls.
///
/// Implementations decode the raw BER value step by step; any failed
/// step surfaces as a [`Decoding`](crate::LdapError::Decoding) error
/// naming that step, not as a panic.
pub trait ControlParser: Sized {
    /// Convert the raw BER value into a control-specific struct.
    fn parse(val: &[u8]) -> Result<Self>;
}

/// Response control.
///
/// If the OID is recognized as corresponding to one of controls implemented by this
/// library while parsing raw BER data of the response, the first element will have
/// a value, otherwise it will be `None`.
#[derive(Clone, Debug)]
pub struct Control(pub Option<ControlType>, pub RawControl);

/// Generic control.
///
/// This struct can be used both for request and response controls. For requests, an
/// independently implemented control can produce an instance of this type and use it
/// to provide an element of the vector passed to
/// [`with_controls()`](../struct.LdapConn.html#method.with_controls) by calling
/// `into()` on the instance.
///
/// For responses, an instance is packed into a [`Control`](struct.Control.html) and
/// can be parsed by calling type-qualified [`parse()`](#method.parse) on that instance,
/// if a [`ControlParser`](trait.ControlParser.html) implementation exists for the
/// specified type.
#[derive(Clone, Debug)]
pub struct RawControl {
    /// OID of the control.
    pub ctype: String,
    /// Criticality, has no meaning on response.
    pub crit: bool,
    /// Raw value of the control, if any.
    pub val: Option<Vec<u8>>,
}

impl RawControl {
    /// Parse the generic control into a control-specific struct.
    pub fn parse<T: ControlParser>(&self) -> Result<T> {
        let val = self.val.as_deref().ok_or(LdapError::Decoding {
            what: "control value",
            source: BerError::Truncated,
        })?;
        T::parse(val)
    }
}

pub fn build_tag(rc: RawControl) -> StructureTag {
    let mut seq = vec![Tag::OctetString(OctetString {
        inner: Vec::from(rc.ctype.as_bytes()),
        ..Default::default()
    })];
    if rc.crit {
        seq.push(Tag::Boolean(Boolean {
            inner: true,
            ..Default::default()
        }));
    }
    if let Some(val) = rc.val {
        seq.push(Tag::OctetString(OctetString {
            inner: val,
            ..Default::default()
        }));
    }
    Tag::Sequence(Sequence {
        inner: seq,
        ..Default::default()
    })
    .into_structure()
}

/// Decode the `[0] IMPLICIT SEQUENCE OF Control` component of a response.
///
/// An unrecognized control marked critical fails the owning operation
/// with `UnavailableCriticalExtension`; unrecognized non-critical
/// controls are kept verbatim so callers can still inspect them.
pub fn parse_controls(t: StructureTag) -> Result<Vec<Control>> {
    fn malformed(what: &'static str) -> LdapError {
        LdapError::Decoding {
            what,
            source: BerError::Truncated,
        }
    }

    let tags = t
        .expect_constructed()
        .ok_or_else(|| malformed("controls"))?
        .into_iter();
    let mut ctrls = Vec::new();
    for ctrl in tags {
        let mut components = ctrl
            .expect_constructed()
            .ok_or_else(|| malformed("control components"))?
            .into_iter();
        let ctype = String::from_utf8(
            components
                .next()
                .and_then(|t| t.expect_primitive())
                .ok_or_else(|| malformed("control type"))?,
        )
        .map_err(|_| LdapError::DecodingUTF8)?;
        let next = components.next();
        let (crit, maybe_val) = match next {
            None => (false, None),
            Some(c) => match c {
                StructureTag {
                    id, ref payload, ..
                } if id == Types::Boolean as u64 => match *payload {
                    PL::P(ref v) => (
                        *v.first().ok_or_else(|| malformed("criticality"))? != 0,
                        components.next(),
                    ),
                    PL::C(_) => return Err(malformed("criticality")),
                },
                StructureTag { id, .. } if id == Types::OctetString as u64 => {
                    (false, Some(c.clone()))
                }
                _ => return Err(malformed("control components")),
            },
        };
        let val = match maybe_val {
            Some(v) => Some(
                v.expect_primitive()
                    .ok_or_else(|| malformed("control value"))?,
            ),
            None => None,
        };
        let known_type = CONTROLS.get(&*ctype).copied();
        if crit && known_type.is_none() {
            return Err(LdapError::UnavailableCriticalExtension(ctype));
        }
        ctrls.push(Control(known_type, RawControl { ctype, crit, val }));
    }
    Ok(ctrls)
}

#[cfg(test)]
mod test {
    use super::*;
    use bertlv::parse::parse_tag;
    use bertlv::write;
    use bytes::BytesMut;

    fn encode_controls(rcs: Vec<RawControl>) -> StructureTag {
        let enc = StructureTag {
            id: 0,
            class: bertlv::common::TagClass::Context,
            payload: PL::C(rcs.into_iter().map(build_tag).collect()),
        };
        let mut buf = BytesMut::new();
        write::encode_into(&mut buf, enc);
        parse_tag(&buf).unwrap().1
    }

    #[test]
    fn unknown_noncritical_is_preserved() {
        let rc = RawControl {
            ctype: "1.2.3.4.5".to_owned(),
            crit: false,
            val: Some(vec![1, 2, 3]),
        };
        let ctrls = parse_controls(encode_controls(vec![rc])).unwrap();
        assert_eq!(ctrls.len(), 1);
        assert!(ctrls[0].0.is_none());
        assert_eq!(ctrls[0].1.ctype, "1.2.3.4.5");
        assert!(!ctrls[0].1.crit);
        assert_eq!(ctrls[0].1.val.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[test]
    fn unknown_critical_is_refused() {
        let rc = RawControl {
            ctype: "1.2.3.4.5".to_owned(),
            crit: true,
            val: None,
        };
        let err = parse_controls(encode_controls(vec![rc])).unwrap_err();
        assert!(matches!(
            err,
            LdapError::UnavailableCriticalExtension(oid) if oid == "1.2.3.4.5"
        ));
    }

    #[test]
    fn known_critical_is_accepted() {
        let rc = RawControl {
            ctype: super::manage_dsa_it::MANAGE_DSA_IT_OID.to_owned(),
            crit: true,
            val: None,
        };
        let ctrls = parse_controls(encode_controls(vec![rc])).unwrap();
        assert_eq!(ctrls[0].0, Some(ControlType::ManageDsaIt));
        assert!(ctrls[0].1.crit);
        assert!(ctrls[0].1.val.is_none());
    }
}

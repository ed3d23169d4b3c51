use bytes::BytesMut;

use bertlv::structures::{ASNTag, Integer, OctetString, Sequence, Tag};
use bertlv::write;
use bertlv::{BerError, BerReader};

use super::{ControlParser, MakeCritical, RawControl};
use crate::result::{LdapError, Result};

pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

/// Paged Results control ([RFC 2696](https://tools.ietf.org/html/rfc2696)).
///
/// The same struct is used for requests and responses. In a request,
/// `size` is the requested page size and `cookie` must be empty on the
/// first page or the cookie from the previous response afterwards. In a
/// response, `size` is the server's estimate of the total result count
/// where it cares to provide one, and an empty `cookie` signals the
/// last page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PagedResults {
    /// Page size or total count estimate.
    pub size: i32,
    /// Opaque paging cookie.
    pub cookie: Vec<u8>,
}

impl MakeCritical for PagedResults {}

impl From<PagedResults> for RawControl {
    fn from(pr: PagedResults) -> RawControl {
        let cval = Tag::Sequence(Sequence {
            inner: vec![
                Tag::Integer(Integer {
                    inner: pr.size as i64,
                    ..Default::default()
                }),
                Tag::OctetString(OctetString {
                    inner: pr.cookie,
                    ..Default::default()
                }),
            ],
            ..Default::default()
        });
        let mut buf = BytesMut::new();
        write::encode_into(&mut buf, cval.into_structure());
        RawControl {
            ctype: PAGED_RESULTS_OID.to_owned(),
            crit: false,
            val: Some(Vec::from(&buf[..])),
        }
    }
}

fn step(what: &'static str, source: BerError) -> LdapError {
    LdapError::Decoding { what, source }
}

impl ControlParser for PagedResults {
    /// Decode the control value in four checked steps, each reported
    /// separately on failure.
    fn parse(val: &[u8]) -> Result<PagedResults> {
        let mut r = BerReader::new(val);
        r.read_start_sequence(None)
            .map_err(|e| step("paged results: start of value sequence", e))?;
        let size = r
            .read_integer()
            .map_err(|e| step("paged results: size", e))
            .and_then(|size| {
                i32::try_from(size)
                    .map_err(|_| step("paged results: size", BerError::NumericOverflow))
            })?;
        let cookie = r
            .read_octet_string()
            .map_err(|e| step("paged results: cookie", e))?;
        r.read_end_sequence()
            .map_err(|e| step("paged results: end of value sequence", e))?;
        Ok(PagedResults { size, cookie })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_page_wire_bytes() {
        let rc = RawControl::from(PagedResults {
            size: 100,
            cookie: vec![],
        });
        assert_eq!(rc.ctype, PAGED_RESULTS_OID);
        // The control value element on the wire: an octet string
        // wrapping SEQUENCE { INTEGER 100, OCTET STRING "" }.
        let wrapped = Tag::OctetString(OctetString {
            inner: rc.val.unwrap(),
            ..Default::default()
        });
        let mut buf = BytesMut::new();
        write::encode_into(&mut buf, wrapped.into_structure());
        assert_eq!(
            &buf[..],
            &[0x04, 0x07, 0x30, 0x05, 0x02, 0x01, 0x64, 0x04, 0x00]
        );
    }

    #[test]
    fn roundtrip() {
        let orig = PagedResults {
            size: 1500,
            cookie: b"opaque-state".to_vec(),
        };
        let rc = RawControl::from(orig.clone());
        let back = rc.parse::<PagedResults>().unwrap();
        assert_eq!(back, orig);
    }

    #[test]
    fn roundtrip_zero_size_empty_cookie() {
        let orig = PagedResults {
            size: 0,
            cookie: vec![],
        };
        let rc = RawControl::from(orig.clone());
        assert_eq!(rc.parse::<PagedResults>().unwrap(), orig);
    }

    #[test]
    fn step_errors_name_the_step() {
        // Value is an octet string, not a sequence.
        let err = PagedResults::parse(&[0x04, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            LdapError::Decoding { what, .. } if what.contains("start of value")
        ));

        // Sequence opens but the size integer is missing.
        let err = PagedResults::parse(&[0x30, 0x02, 0x04, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            LdapError::Decoding { what, .. } if what.contains("size")
        ));

        // Size present, cookie missing.
        let err = PagedResults::parse(&[0x30, 0x03, 0x02, 0x01, 0x64]).unwrap_err();
        assert!(matches!(
            err,
            LdapError::Decoding { what, .. } if what.contains("cookie")
        ));

        // Extra element after the cookie.
        let err =
            PagedResults::parse(&[0x30, 0x08, 0x02, 0x01, 0x64, 0x04, 0x00, 0x02, 0x01, 0x00])
                .unwrap_err();
        assert!(matches!(
            err,
            LdapError::Decoding { what, .. } if what.contains("end of value")
        ));
    }
}

use super::{MakeCritical, RawControl};

pub const MANAGE_DSA_IT_OID: &str = "2.16.840.1.113730.3.4.2";

/// Manage DSA IT control ([RFC 3296](https://tools.ietf.org/html/rfc3296)).
///
/// Makes the server treat referral entries as regular entries. The
/// control carries no value.
#[derive(Clone, Debug, Default)]
pub struct ManageDsaIt;

impl MakeCritical for ManageDsaIt {}

impl From<ManageDsaIt> for RawControl {
    fn from(_: ManageDsaIt) -> RawControl {
        RawControl {
            ctype: MANAGE_DSA_IT_OID.to_owned(),
            crit: false,
            val: None,
        }
    }
}

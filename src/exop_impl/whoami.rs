use std::str;

use super::{Exop, ExopParser};
use crate::result::{LdapError, Result};

pub const WHOAMI_OID: &str = "1.3.6.1.4.1.4203.1.11.3";

/// Who Am I extended operation ([RFC 4532](https://tools.ietf.org/html/rfc4532)).
///
/// The request carries no data. The response contains the authorization
/// identity the server associates with the connection, which is empty
/// for an anonymous session.
#[derive(Clone, Debug)]
pub struct WhoAmI;

/// Who Am I response.
#[derive(Clone, Debug)]
pub struct WhoAmIResp {
    /// Authorization identity, typically in the `dn:` or `u:` form.
    pub authzid: String,
}

impl From<WhoAmI> for Exop {
    fn from(_: WhoAmI) -> Exop {
        Exop {
            name: Some(WHOAMI_OID.to_owned()),
            val: None,
        }
    }
}

impl ExopParser for WhoAmIResp {
    fn parse(val: &[u8]) -> Result<WhoAmIResp> {
        let authzid = str::from_utf8(val)
            .map_err(|_| LdapError::DecodingUTF8)?
            .to_owned();
        Ok(WhoAmIResp { authzid })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn request_shape() {
        let exop = Exop::from(WhoAmI);
        assert_eq!(exop.name.as_deref(), Some(WHOAMI_OID));
        assert!(exop.val.is_none());
    }

    #[test]
    fn response_parse() {
        let resp = WhoAmIResp::parse(b"dn:cn=admin,dc=example,dc=org").unwrap();
        assert_eq!(resp.authzid, "dn:cn=admin,dc=example,dc=org");

        let anon = WhoAmIResp::parse(b"").unwrap();
        assert!(anon.authzid.is_empty());
    }

    #[test]
    fn response_rejects_bad_utf8() {
        assert!(WhoAmIResp::parse(&[0xFF, 0xFE]).is_err());
    }
}

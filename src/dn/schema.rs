//! Process-wide attribute type registry.
//!
//! Resolution never fails: a descriptor with no registered entry
//! produces a synthesized handle whose values are prepared as
//! case-ignore directory strings, which is how servers treat values of
//! types they cannot look up either.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

/// Value syntax driving normalization and comparison of a type's values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrSyntax {
    /// Case-ignore string, prepared per RFC 4518.
    DirectoryString,
    /// Canonical decimal integer, compared numerically.
    Integer,
    /// Raw octets, compared exactly.
    Binary,
}

/// A registered (or synthesized) attribute type.
///
/// Immutable once created; handles are shared.
#[derive(Clone, Debug)]
pub struct AttributeType {
    /// Dotted-decimal OID, empty for synthesized types.
    pub oid: String,
    /// Canonical name, lowercase. For a synthesized type this is the
    /// lowercased descriptor it was resolved from.
    pub canonical: String,
    /// Value syntax.
    pub syntax: AttrSyntax,
    /// Whether the type was found in the registry.
    pub registered: bool,
}

type Registry = HashMap<String, Arc<AttributeType>>;

static REGISTRY: LazyLock<RwLock<Registry>> = LazyLock::new(|| {
    let mut reg = Registry::new();
    let std_types: &[(&str, &[&str], AttrSyntax)] = &[
        ("2.5.4.3", &["cn", "commonName"], AttrSyntax::DirectoryString),
        ("2.5.4.4", &["sn", "surname"], AttrSyntax::DirectoryString),
        ("2.5.4.6", &["c", "countryName"], AttrSyntax::DirectoryString),
        ("2.5.4.7", &["l", "localityName"], AttrSyntax::DirectoryString),
        ("2.5.4.8", &["st"], AttrSyntax::DirectoryString),
        ("2.5.4.9", &["street"], AttrSyntax::DirectoryString),
        ("2.5.4.10", &["o", "organizationName"], AttrSyntax::DirectoryString),
        ("2.5.4.11", &["ou", "organizationalUnitName"], AttrSyntax::DirectoryString),
        ("2.5.4.12", &["title"], AttrSyntax::DirectoryString),
        ("2.5.4.13", &["description"], AttrSyntax::DirectoryString),
        ("2.5.4.20", &["telephoneNumber"], AttrSyntax::DirectoryString),
        ("2.5.4.36", &["userCertificate"], AttrSyntax::Binary),
        ("2.5.4.42", &["givenName"], AttrSyntax::DirectoryString),
        ("0.9.2342.19200300.100.1.1", &["uid"], AttrSyntax::DirectoryString),
        ("0.9.2342.19200300.100.1.3", &["mail"], AttrSyntax::DirectoryString),
        ("0.9.2342.19200300.100.1.7", &["photo"], AttrSyntax::Binary),
        ("0.9.2342.19200300.100.1.25", &["dc", "domainComponent"], AttrSyntax::DirectoryString),
        ("0.9.2342.19200300.100.1.60", &["jpegPhoto"], AttrSyntax::Binary),
    ];
    for &(oid, names, syntax) in std_types {
        insert(&mut reg, oid, names, syntax);
    }
    RwLock::new(reg)
});

fn insert(reg: &mut Registry, oid: &str, names: &[&str], syntax: AttrSyntax) {
    let canonical = names.first().map_or(oid, |n| n).to_lowercase();
    let at = Arc::new(AttributeType {
        oid: oid.to_owned(),
        canonical,
        syntax,
        registered: true,
    });
    reg.insert(oid.to_owned(), Arc::clone(&at));
    for name in names {
        reg.insert(name.to_lowercase(), Arc::clone(&at));
    }
}

/// Register an attribute type under its OID and all of its names.
///
/// The first name is the canonical one. Re-registration replaces the
/// previous entry under every key it adds.
pub fn register_attribute_type(oid: &str, names: &[&str], syntax: AttrSyntax) {
    let mut reg = REGISTRY.write().expect("attribute type registry");
    insert(&mut reg, oid, names, syntax);
}

/// Resolve a descriptor (name or OID, case-insensitive) to a type handle.
pub fn resolve(descriptor: &str) -> Arc<AttributeType> {
    let key = descriptor.to_lowercase();
    if let Some(at) = REGISTRY.read().expect("attribute type registry").get(&key) {
        return Arc::clone(at);
    }
    Arc::new(AttributeType {
        oid: String::new(),
        canonical: key,
        syntax: AttrSyntax::DirectoryString,
        registered: false,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_by_name_oid_and_case() {
        let by_name = resolve("CN");
        let by_long = resolve("commonname");
        let by_oid = resolve("2.5.4.3");
        assert!(by_name.registered);
        assert_eq!(by_name.canonical, "cn");
        assert_eq!(by_long.canonical, "cn");
        assert_eq!(by_oid.canonical, "cn");
        assert_eq!(by_name.oid, "2.5.4.3");
    }

    #[test]
    fn synthesized_handle() {
        let at = resolve("1.3.6.1.4.1.1466.0");
        assert!(!at.registered);
        assert_eq!(at.canonical, "1.3.6.1.4.1.1466.0");
        assert_eq!(at.syntax, AttrSyntax::DirectoryString);
    }

    #[test]
    fn registration() {
        register_attribute_type("1.2.3.4.5.6.7", &["x-test-reg-type"], AttrSyntax::Integer);
        let at = resolve("X-Test-Reg-Type");
        assert!(at.registered);
        assert_eq!(at.syntax, AttrSyntax::Integer);
        assert_eq!(at.canonical, "x-test-reg-type");
    }
}

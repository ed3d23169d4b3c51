//! Distinguished name model, parser, and normalizer.
//!
//! The string syntax follows RFC 4514, with the leniencies directory
//! servers commonly extend: whitespace around separators, `;` as an RDN
//! separator, quoted values, and the `OID.` descriptor prefix.
//! Normalization for equality, ordering, and hashing resolves each
//! attribute type against the [`schema`] registry and prepares string
//! values per RFC 4518, so e.g. `OU=Sales+CN=J. Smith` and
//! `cn=J. SMITH+ou=sales` compare equal.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::{self, FromStr};
use std::sync::Arc;

use percent_encoding::{percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::result::{LdapError, Result};

pub mod prep;
pub mod schema;

use schema::{AttrSyntax, AttributeType};

/// Percent-encode everything outside the URL unreserved set.
const VALUE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Normalized form of an AVA value, fixed at construction.
#[derive(Clone, Debug)]
enum NormValue {
    /// Prepared string (or canonical decimal for integer syntax).
    Str(String),
    /// Exact octets, for binary syntax and values that defeat
    /// string preparation.
    Bytes(Vec<u8>),
}

/// Attribute value assertion: one `type=value` pair.
#[derive(Clone, Debug)]
pub struct Ava {
    attr: Arc<AttributeType>,
    name: String,
    value: Vec<u8>,
    norm: NormValue,
}

impl Ava {
    /// Create an AVA from a descriptor and raw value octets.
    ///
    /// The descriptor must be a valid attribute description: a keyword,
    /// a dotted-decimal OID, or `OID.` followed by one.
    pub fn new(descriptor: &str, value: impl Into<Vec<u8>>) -> Result<Ava> {
        let mut parser = DnParser::new(descriptor);
        let (name, key) = parser.parse_descriptor()?;
        if parser.peek().is_some() {
            return Err(LdapError::invalid_dn(
                descriptor,
                "invalid attribute descriptor",
            ));
        }
        Ok(Ava::from_parts(name, &key, value.into()))
    }

    fn from_parts(name: String, key: &str, value: Vec<u8>) -> Ava {
        let attr = schema::resolve(key);
        let norm = normalize_value(&attr, &value);
        Ava {
            attr,
            name,
            value,
            norm,
        }
    }

    /// The resolved attribute type handle.
    pub fn attribute_type(&self) -> &Arc<AttributeType> {
        &self.attr
    }

    /// The descriptor as originally spelled.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw value octets.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Canonical lowercase type name used in normalized output.
    pub fn norm_type(&self) -> &str {
        &self.attr.canonical
    }

    fn norm_bytes(&self) -> &[u8] {
        match &self.norm {
            NormValue::Str(s) => s.as_bytes(),
            NormValue::Bytes(b) => b,
        }
    }

    fn cmp_norm(&self, other: &Ava) -> Ordering {
        self.norm_type()
            .cmp(other.norm_type())
            .then_with(|| match (&self.norm, &other.norm) {
                (NormValue::Str(x), NormValue::Str(y))
                    if self.attr.syntax == AttrSyntax::Integer
                        && other.attr.syntax == AttrSyntax::Integer =>
                {
                    cmp_decimal(x, y)
                }
                _ => self.norm_bytes().cmp(other.norm_bytes()),
            })
    }
}

impl fmt::Display for Ava {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}=", self.name)?;
        write_escaped_value(f, &self.value)
    }
}

fn normalize_value(attr: &AttributeType, value: &[u8]) -> NormValue {
    match attr.syntax {
        AttrSyntax::Binary => NormValue::Bytes(value.to_vec()),
        AttrSyntax::Integer => match canonical_decimal(value) {
            Some(s) => NormValue::Str(s),
            None => NormValue::Bytes(value.to_vec()),
        },
        AttrSyntax::DirectoryString => {
            match str::from_utf8(value).ok().and_then(|s| prep::prepare(s).ok()) {
                Some(s) => NormValue::Str(s),
                None => NormValue::Bytes(value.to_vec()),
            }
        }
    }
}

/// Canonical decimal form: no leading zeros, `-` only on nonzero
/// negatives. `None` if the octets aren't a plain decimal integer.
fn canonical_decimal(value: &[u8]) -> Option<String> {
    let s = str::from_utf8(value).ok()?;
    let s = s.trim_matches(' ');
    let (neg, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() {
        return Some("0".to_owned());
    }
    Some(if neg {
        format!("-{}", stripped)
    } else {
        stripped.to_owned()
    })
}

fn cmp_decimal(a: &str, b: &str) -> Ordering {
    let a_neg = a.starts_with('-');
    let b_neg = b.starts_with('-');
    match (a_neg, b_neg) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        (true, true) => b.len().cmp(&a.len()).then_with(|| b.cmp(a)),
    }
}

pub(crate) fn write_escaped_value(f: &mut dyn fmt::Write, value: &[u8]) -> fmt::Result {
    const SPECIALS: &[char] = &['"', '+', ',', ';', '<', '>', '\\', '='];
    match str::from_utf8(value) {
        Ok(s) => {
            let last = s.chars().count().wrapping_sub(1);
            for (i, c) in s.chars().enumerate() {
                match c {
                    ' ' if i == 0 || i == last => write!(f, "\\ ")?,
                    '#' if i == 0 => write!(f, "\\#")?,
                    c if SPECIALS.contains(&c) => write!(f, "\\{}", c)?,
                    c if (c as u32) < 0x20 || c == '\u{7F}' => {
                        write!(f, "\\{:02X}", c as u32)?
                    }
                    c => write!(f, "{}", c)?,
                }
            }
        }
        Err(_) => {
            let last = value.len().wrapping_sub(1);
            for (i, &b) in value.iter().enumerate() {
                match b {
                    b' ' if i == 0 || i == last => write!(f, "\\ ")?,
                    b'#' if i == 0 => write!(f, "\\#")?,
                    b if SPECIALS.contains(&(b as char)) => write!(f, "\\{}", b as char)?,
                    0x20..=0x7E => write!(f, "{}", b as char)?,
                    b => write!(f, "\\{:02X}", b)?,
                }
            }
        }
    }
    Ok(())
}

/// Relative distinguished name: one or more AVAs joined by `+`.
///
/// No two AVAs share an attribute type. The textual order of AVAs is
/// preserved for display; normalized forms sort AVAs by normalized type
/// and value.
#[derive(Clone, Debug)]
pub struct Rdn {
    avas: Vec<Ava>,
}

impl Rdn {
    /// Build an RDN from descriptor/value pairs.
    ///
    /// At least one pair is required; duplicate attribute types are
    /// refused.
    pub fn new(avas: &[(&str, &[u8])]) -> Result<Rdn> {
        if avas.is_empty() {
            return Err(LdapError::InvalidArgument(
                "an RDN requires at least one AVA".to_owned(),
            ));
        }
        let mut rdn = Rdn { avas: Vec::new() };
        for &(descriptor, value) in avas {
            if !rdn.add_value(descriptor, value)? {
                return Err(LdapError::InvalidArgument(format!(
                    "duplicate attribute type in RDN: {}",
                    descriptor
                )));
            }
        }
        Ok(rdn)
    }

    /// Append an AVA. Returns `false` without modifying the RDN when an
    /// AVA with the same attribute type is already present.
    pub fn add_value(&mut self, descriptor: &str, value: &[u8]) -> Result<bool> {
        let ava = Ava::new(descriptor, value)?;
        if self
            .avas
            .iter()
            .any(|a| a.norm_type() == ava.norm_type())
        {
            return Ok(false);
        }
        self.avas.push(ava);
        Ok(true)
    }

    pub fn avas(&self) -> &[Ava] {
        &self.avas
    }

    pub fn num_values(&self) -> usize {
        self.avas.len()
    }

    pub fn is_multi_valued(&self) -> bool {
        self.avas.len() > 1
    }

    /// Whether an AVA with the given attribute type is present.
    pub fn has_attribute_type(&self, descriptor: &str) -> bool {
        let canonical = schema::resolve(descriptor).canonical.clone();
        self.avas.iter().any(|a| a.norm_type() == canonical)
    }

    /// Whether the AVA for the given type holds a value that compares
    /// equal to `value` under the type's matching rule.
    pub fn has_value(&self, descriptor: &str, value: &[u8]) -> bool {
        let canonical = schema::resolve(descriptor).canonical.clone();
        self.avas.iter().any(|a| {
            a.norm_type() == canonical && {
                let cand = normalize_value(&a.attr, value);
                let cand_bytes = match &cand {
                    NormValue::Str(s) => s.as_bytes(),
                    NormValue::Bytes(b) => b,
                };
                a.norm_bytes() == cand_bytes
            }
        })
    }

    fn sorted_avas(&self) -> Vec<&Ava> {
        let mut sorted: Vec<&Ava> = self.avas.iter().collect();
        sorted.sort_by(|a, b| a.cmp_norm(b));
        sorted
    }

    /// Normalized, URL-safe rendering: AVAs sorted, types canonical,
    /// values percent-encoded outside the unreserved set.
    pub fn to_normalized_url_safe_string(&self) -> String {
        self.sorted_avas()
            .iter()
            .map(|ava| {
                format!(
                    "{}={}",
                    ava.norm_type(),
                    percent_encode(ava.norm_bytes(), VALUE_SET)
                )
            })
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, ava) in self.avas.iter().enumerate() {
            if i > 0 {
                write!(f, "+")?;
            }
            write!(f, "{}", ava)?;
        }
        Ok(())
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Rdn) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rdn {}

impl PartialOrd for Rdn {
    fn partial_cmp(&self, other: &Rdn) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rdn {
    /// Lexicographic over the sorted AVA list; when the shared prefix
    /// ties, the RDN with fewer AVAs orders first.
    fn cmp(&self, other: &Rdn) -> Ordering {
        let a = self.sorted_avas();
        let b = other.sorted_avas();
        for (x, y) in a.iter().zip(b.iter()) {
            match x.cmp_norm(y) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        a.len().cmp(&b.len())
    }
}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for ava in self.sorted_avas() {
            ava.norm_type().hash(state);
            ava.norm_bytes().hash(state);
        }
    }
}

impl FromStr for Rdn {
    type Err = LdapError;

    fn from_str(s: &str) -> Result<Rdn> {
        let mut parser = DnParser::new(s);
        let rdn = parser.parse_rdn()?;
        match parser.peek() {
            None => Ok(rdn),
            Some(_) => Err(LdapError::invalid_dn(s, "trailing input after RDN")),
        }
    }
}

/// Distinguished name: a leaf-to-root sequence of RDNs.
///
/// An empty sequence is the root DN.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The root DN.
    pub fn root() -> Dn {
        Dn { rdns: Vec::new() }
    }

    pub fn from_rdns(rdns: Vec<Rdn>) -> Dn {
        Dn { rdns }
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// RDNs in leaf-to-root order.
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// The DN with the leaf RDN removed; `None` for the root.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Dn {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    pub fn to_normalized_url_safe_string(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::to_normalized_url_safe_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

impl FromStr for Dn {
    type Err = LdapError;

    fn from_str(s: &str) -> Result<Dn> {
        if s.chars().all(|c| c == ' ') {
            return Ok(Dn::root());
        }
        let mut parser = DnParser::new(s);
        let mut rdns = vec![parser.parse_rdn()?];
        loop {
            match parser.peek() {
                None => break,
                Some(',') | Some(';') => {
                    parser.next();
                    rdns.push(parser.parse_rdn()?);
                }
                Some(_) => return Err(LdapError::invalid_dn(s, "expected RDN separator")),
            }
        }
        Ok(Dn { rdns })
    }
}

struct DnParser<'a> {
    input: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> DnParser<'a> {
    fn new(input: &'a str) -> DnParser<'a> {
        DnParser {
            input,
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.pos += 1;
        }
    }

    fn err(&self, reason: impl Into<String>) -> LdapError {
        LdapError::invalid_dn(self.input, reason)
    }

    fn parse_rdn(&mut self) -> Result<Rdn> {
        let mut avas = vec![self.parse_ava()?];
        while self.peek() == Some('+') {
            self.next();
            let ava = self.parse_ava()?;
            if avas.iter().any(|a: &Ava| a.norm_type() == ava.norm_type()) {
                return Err(self.err("duplicate attribute type in RDN"));
            }
            avas.push(ava);
        }
        Ok(Rdn { avas })
    }

    fn parse_ava(&mut self) -> Result<Ava> {
        self.skip_spaces();
        let (name, key) = self.parse_descriptor()?;
        self.skip_spaces();
        match self.next() {
            Some('=') => (),
            _ => return Err(self.err("expected '=' after attribute type")),
        }
        let value = self.parse_value()?;
        Ok(Ava::from_parts(name, &key, value))
    }

    /// Returns the descriptor as spelled and the key used for schema
    /// resolution. The `OID.` prefix form is accepted on input but the
    /// prefix is dropped, leaving the bare numeric OID for both.
    fn parse_descriptor(&mut self) -> Result<(String, String)> {
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() => {
                let mut kw = String::new();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '-' {
                        kw.push(c);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                if kw.eq_ignore_ascii_case("oid") && self.peek() == Some('.') {
                    self.next();
                    let oid = self.parse_numeric_oid()?;
                    return Ok((oid.clone(), oid));
                }
                Ok((kw.clone(), kw))
            }
            Some(c) if c.is_ascii_digit() => {
                let oid = self.parse_numeric_oid()?;
                Ok((oid.clone(), oid))
            }
            Some(_) => Err(self.err("invalid start of attribute type")),
            None => Err(self.err("missing attribute type")),
        }
    }

    fn parse_numeric_oid(&mut self) -> Result<String> {
        let mut oid = String::new();
        loop {
            let mut component = String::new();
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    component.push(c);
                    self.pos += 1;
                } else {
                    break;
                }
            }
            if component.is_empty() {
                return Err(self.err("empty numeric OID component"));
            }
            if component.len() > 1 && component.starts_with('0') {
                return Err(self.err("leading zero in numeric OID component"));
            }
            oid.push_str(&component);
            if self.peek() == Some('.') {
                self.next();
                oid.push('.');
            } else {
                break;
            }
        }
        Ok(oid)
    }

    fn parse_value(&mut self) -> Result<Vec<u8>> {
        self.skip_spaces();
        match self.peek() {
            Some('#') => {
                self.next();
                self.parse_hex_value()
            }
            Some('"') => {
                self.next();
                self.parse_quoted_value()
            }
            _ => self.parse_bare_value(),
        }
    }

    fn hex_nibble(&self, c: char) -> Result<u8> {
        c.to_digit(16)
            .map(|d| d as u8)
            .ok_or_else(|| self.err("invalid hex digit in value"))
    }

    fn parse_hex_value(&mut self) -> Result<Vec<u8>> {
        let mut digits = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_hexdigit() {
                digits.push(c);
                self.pos += 1;
            } else if matches!(c, ',' | ';' | '+' | ' ') {
                break;
            } else {
                return Err(self.err("invalid hex digit in value"));
            }
        }
        if digits.is_empty() || digits.len() % 2 != 0 {
            return Err(self.err("hex value needs an even, nonzero digit count"));
        }
        let mut out = Vec::with_capacity(digits.len() / 2);
        for pair in digits.chunks(2) {
            out.push(self.hex_nibble(pair[0])? << 4 | self.hex_nibble(pair[1])?);
        }
        self.skip_trailing_spaces_before_separator();
        Ok(out)
    }

    fn parse_quoted_value(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.next() {
                None => return Err(self.err("unterminated quoted value")),
                Some('"') => break,
                Some('\\') => self.parse_escape(&mut out)?,
                Some(c) => push_char(&mut out, c),
            }
        }
        self.skip_trailing_spaces_before_separator();
        Ok(out)
    }

    fn parse_bare_value(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut trailing_spaces = 0;
        while let Some(c) = self.peek() {
            match c {
                ',' | ';' | '+' => break,
                '"' => return Err(self.err("unexpected quote in value")),
                '\\' => {
                    self.next();
                    self.parse_escape(&mut out)?;
                    trailing_spaces = 0;
                }
                ' ' => {
                    self.next();
                    out.push(b' ');
                    trailing_spaces += 1;
                }
                c => {
                    self.next();
                    push_char(&mut out, c);
                    trailing_spaces = 0;
                }
            }
        }
        out.truncate(out.len() - trailing_spaces);
        Ok(out)
    }

    /// After a quoted or hex value only spaces may precede the
    /// separator or the end of input.
    fn skip_trailing_spaces_before_separator(&mut self) {
        self.skip_spaces();
    }

    fn parse_escape(&mut self, out: &mut Vec<u8>) -> Result<()> {
        const ESCAPABLE: &[char] = &['"', '#', '+', ',', ';', '<', '>', '=', '\\', ' '];
        match self.next() {
            None => Err(self.err("truncated escape sequence")),
            Some(c) if c.is_ascii_hexdigit() => {
                let hi = self.hex_nibble(c)?;
                let lo = match self.next() {
                    Some(c2) if c2.is_ascii_hexdigit() => self.hex_nibble(c2)?,
                    _ => return Err(self.err("truncated hex escape")),
                };
                out.push(hi << 4 | lo);
                Ok(())
            }
            Some(c) if ESCAPABLE.contains(&c) => {
                push_char(out, c);
                Ok(())
            }
            Some(_) => Err(self.err("invalid escape sequence")),
        }
    }
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

#[cfg(test)]
mod test {
    use super::schema::{register_attribute_type, AttrSyntax};
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn rdn(s: &str) -> Rdn {
        s.parse().unwrap()
    }

    fn hash_of(rdn: &Rdn) -> u64 {
        let mut h = DefaultHasher::new();
        rdn.hash(&mut h);
        h.finish()
    }

    #[test]
    fn parse_normalize_display() {
        // (input, normalized URL-safe, display)
        let cases = [
            ("OU=Sales+CN=J. Smith", "cn=j.%20smith+ou=sales", "OU=Sales+CN=J. Smith"),
            ("CN=Lu\\C4\\8Di\\C4\\87", "cn=luc%CC%8Cic%CC%81", "CN=Lu\u{10D}i\u{107}"),
            (
                "1.3.6.1.4.1.1466.0=#04024869",
                "1.3.6.1.4.1.1466.0=hi",
                "1.3.6.1.4.1.1466.0=\\04\\02Hi",
            ),
            ("photo=\\ john \\ ", "photo=%20john%20%20", "photo=\\ john \\ "),
            ("cn=John+a=", "a=+cn=john", "cn=John+a="),
            (
                "O=\"Sue, Grabbit and Runn\"",
                "o=sue%2C%20grabbit%20and%20runn",
                "O=Sue\\, Grabbit and Runn",
            ),
            (
                "OU=\u{55b6}\u{696d}\u{90e8}",
                "ou=%E5%96%B6%E6%A5%AD%E9%83%A8",
                "OU=\u{55b6}\u{696d}\u{90e8}",
            ),
            ("cn=Before\\0dAfter", "cn=before%20after", "cn=Before\\0DAfter"),
            ("OID.2.5.4.3=Jim", "cn=jim", "2.5.4.3=Jim"),
            (
                "OID.1.3.6.1.4.1.1466.0=#04024869",
                "1.3.6.1.4.1.1466.0=hi",
                "1.3.6.1.4.1.1466.0=\\04\\02Hi",
            ),
        ];
        for (input, norm, display) in cases {
            let rdn = rdn(input);
            assert_eq!(rdn.to_normalized_url_safe_string(), norm, "norm of {input}");
            assert_eq!(rdn.to_string(), display, "display of {input}");
        }
    }

    #[test]
    fn display_roundtrips_through_parse() {
        for input in [
            "OU=Sales+CN=J. Smith",
            "photo=\\ john \\ ",
            "cn=John+a=",
            "1.3.6.1.4.1.1466.0=#04024869",
        ] {
            let first = rdn(input);
            let back = rdn(&first.to_string());
            assert_eq!(first, back, "roundtrip of {input}");
        }
    }

    #[test]
    fn reject_corpus() {
        let illegal = [
            "",
            " ",
            "=",
            "manager",
            "manager ",
            "cn+",
            "cn+Jim",
            "cn=Jim+",
            "cn=Jim +",
            "cn=Jim+ ",
            "cn=Jim+sn",
            "cn=Jim+sn ",
            "cn=Jim+sn equals",
            "cn=Jim,",
            "cn=Jim;",
            "cn=Jim,  ",
            "cn=Jim+sn=a,",
            "cn=Jim, sn=Jam ",
            "cn+uid=Jim",
            "-cn=Jim",
            "/tmp=a",
            "\\tmp=a",
            "cn;lang-en=Jim",
            "@cn=Jim",
            "_name_=Jim",
            "\u{3C0}=pi",
            "v1.0=buggy",
            "cn=Jim+sn=Bob++",
            "cn=Jim+sn=Bob+,",
            "1.3.6.1.4.1.1466..0=#04024869",
        ];
        for input in illegal {
            let res: Result<Rdn> = input.parse();
            assert!(
                matches!(res, Err(LdapError::InvalidDn { .. })),
                "should reject {input:?}"
            );
        }
    }

    #[test]
    fn trailing_empty_value_accepted() {
        let r = rdn("AB-global=");
        assert_eq!(r.num_values(), 1);
        assert_eq!(r.avas()[0].value(), b"");
        assert_eq!(r.to_string(), "AB-global=");
    }

    #[test]
    fn equality_and_hashing() {
        let equal_pairs = [
            ("cn=Jim", "CN=jim"),
            ("OU=Sales+CN=J. Smith", "cn=j. smith+OU=SALES"),
            ("1.3.6.1.4.1.1466.0=#04024869", "1.3.6.1.4.1.1466.0=hi"),
            ("CN=Lu\\C4\\8Di\\C4\\87", "cn=LUC\\CC\\8CIC\\CC\\81"),
            ("cn=  multiple   spaces  here ", "cn=multiple spaces here"),
            ("cn=Stra\u{DF}e", "cn=STRASSE"),
        ];
        for (a, b) in equal_pairs {
            let (ra, rb) = (rdn(a), rdn(b));
            assert_eq!(ra, rb, "{a} == {b}");
            assert_eq!(hash_of(&ra), hash_of(&rb), "hash {a} == hash {b}");
            assert_eq!(ra.cmp(&rb), Ordering::Equal);
        }

        let unequal_pairs = [
            ("cn=Jim", "cn=Jam"),
            ("cn=Jim", "sn=Jim"),
            ("photo=A", "photo=a"),
        ];
        for (a, b) in unequal_pairs {
            assert_ne!(rdn(a), rdn(b), "{a} != {b}");
        }
    }

    #[test]
    fn ordering() {
        assert!(rdn("cn=hello") < rdn("cn=hello+sn=world"));
        assert!(rdn("cn=aaa") < rdn("cn=aab"));
        assert!(rdn("cn=Jim") > rdn("a=Jim"));

        register_attribute_type("1.3.6.1.4.1.99999.501", &["x-test-integer-type"], AttrSyntax::Integer);
        assert!(rdn("x-test-integer-type=10") > rdn("x-test-integer-type=9"));
        assert!(rdn("x-test-integer-type=999") < rdn("x-test-integer-type=1000"));
        assert!(rdn("x-test-integer-type=-1") < rdn("x-test-integer-type=0"));
        assert_eq!(rdn("x-test-integer-type=01"), rdn("x-test-integer-type=1"));
    }

    #[test]
    fn rdn_mutators() {
        let mut r = Rdn::new(&[("cn", b"Jim")]).unwrap();
        assert!(!r.is_multi_valued());
        assert!(r.add_value("sn", b"Smith").unwrap());
        assert!(r.is_multi_valued());
        assert_eq!(r.num_values(), 2);
        // Same type again, even with a different value, is a no-op.
        assert!(!r.add_value("CN", b"Bob").unwrap());
        assert_eq!(r.num_values(), 2);

        assert!(r.has_attribute_type("cn"));
        assert!(r.has_attribute_type("commonName"));
        assert!(!r.has_attribute_type("uid"));
        assert!(r.has_value("cn", b"JIM"));
        assert!(!r.has_value("cn", b"Bob"));
    }

    #[test]
    fn empty_rdn_construction_fails() {
        assert!(matches!(
            Rdn::new(&[]),
            Err(LdapError::InvalidArgument(_))
        ));
    }

    #[test]
    fn escaped_single_space_value() {
        let r = Rdn::new(&[("dc", b" ")]).unwrap();
        assert_eq!(r.to_string(), "dc=\\ ");
        assert_eq!(rdn("dc=\\ "), r);
    }

    #[test]
    fn dn_parsing_and_display() {
        let dn: Dn = "uid=jdoe, ou=People; dc=example,dc=org".parse().unwrap();
        assert_eq!(dn.rdns().len(), 4);
        assert_eq!(dn.to_string(), "uid=jdoe,ou=People,dc=example,dc=org");
        assert_eq!(
            dn.to_normalized_url_safe_string(),
            "uid=jdoe,ou=people,dc=example,dc=org"
        );

        let root: Dn = "".parse().unwrap();
        assert!(root.is_root());
        assert_eq!(root.to_string(), "");

        let leaf: Dn = "cn=leaf".parse().unwrap();
        assert_eq!(leaf.parent(), Some(Dn::root()));
        assert!(Dn::root().parent().is_none());
    }

    #[test]
    fn dn_equality_after_normalization() {
        let a: Dn = "UID=JDoe,OU=People,DC=Example,DC=Org".parse().unwrap();
        let b: Dn = "uid=jdoe, ou=people, dc=example, dc=org".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn dn_rejects_bad_components() {
        for input in ["cn=a,,cn=b", "cn=a,", "cn=a,=b", "bogus"] {
            let res: Result<Dn> = input.parse();
            assert!(res.is_err(), "should reject {input:?}");
        }
    }

    #[test]
    fn normalization_idempotent() {
        for input in [
            "OU=Sales+CN=J. Smith",
            "CN=Lu\\C4\\8Di\\C4\\87",
            "cn=John+a=",
        ] {
            let norm = rdn(input).to_normalized_url_safe_string();
            // The normalized form parses back to an equal RDN whose
            // normalized form is identical.
            let reparsed: Rdn = percent_decode_to_rdn(&norm);
            assert_eq!(reparsed.to_normalized_url_safe_string(), norm);
        }
    }

    fn percent_decode_to_rdn(norm: &str) -> Rdn {
        let mut avas: Vec<(String, Vec<u8>)> = Vec::new();
        for part in norm.split('+') {
            let (ty, val) = part.split_once('=').unwrap();
            let bytes = percent_encoding::percent_decode_str(val).collect();
            avas.push((ty.to_owned(), bytes));
        }
        let pairs: Vec<(&str, &[u8])> = avas
            .iter()
            .map(|(t, v)| (t.as_str(), v.as_slice()))
            .collect();
        Rdn::new(&pairs).unwrap()
    }
}

//! BER (Basic Encoding Rules) serialization for the LDAP wire protocol.
//!
//! Two layers are provided. The tag-tree layer (`structures`, `parse`,
//! `write`) models a whole element as a [`StructureTag`](structure::StructureTag)
//! and is used by the message codec, which needs to hold complete protocol
//! ops in memory. The cursor layer ([`BerReader`], [`BerWriter`]) walks an
//! encoding step by step with explicit sequence limits and is used for
//! control and extended-operation values, where decode failures must be
//! reported per element.
//!
//! No DER restrictions are enforced on read; writing always emits the
//! minimal length form.

pub mod common;
pub mod error;
pub mod parse;
pub mod reader;
pub mod structure;
pub mod structures;
pub mod universal;
pub mod write;
pub mod writer;

pub use error::BerError;
pub use nom::IResult;
pub use reader::BerReader;
pub use writer::BerWriter;

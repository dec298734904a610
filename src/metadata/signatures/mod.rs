//! Signature blobs as read from the target's metadata.
//!
//! Every descriptive facet of a live member that mentions a type (a field's type, a method's
//! parameters, the arguments of a generic instantiation) is stored in the target as a compressed
//! signature blob (ECMA-335 II.23.2). This module parses those blobs and answers the two questions
//! the live model needs to decide whether a resolved object may be cached:
//!
//! - [`TypeSignature::contains_generic_parameter`]: does the signature still mention `!n`/`!!n`?
//! - [`TypeSignature::instantiate`]: substitute the arguments of a
//!   [`crate::metadata::context::GenericContext`].
//!
//! # Examples
//!
//! ```rust
//! use livescope::metadata::signatures::{parse_type_spec_signature, TypeSignature};
//! use livescope::metadata::context::GenericContext;
//!
//! // List<!0>
//! let spec = parse_type_spec_signature(&[0x15, 0x12, 0x05, 0x01, 0x13, 0x00])?;
//! assert!(spec.base.contains_generic_parameter());
//!
//! let closed = spec.base.instantiate(&GenericContext::for_type(vec![TypeSignature::I4]));
//! assert!(!closed.contains_generic_parameter());
//! # Ok::<(), livescope::Error>(())
//! ```

mod parser;
mod types;

pub use parser::*;
pub use types::*;

use crate::Result;

/// Parse a method signature (`MethodDefSig`, `MethodRefSig`, `StandAloneMethodSig`)
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_method_signature(data: &[u8]) -> Result<SignatureMethod> {
    let mut parser = SignatureParser::new(data);
    parser.parse_method_signature()
}

/// Parse a field signature
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_field_signature(data: &[u8]) -> Result<SignatureField> {
    let mut parser = SignatureParser::new(data);
    parser.parse_field_signature()
}

/// Parse a property signature
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_property_signature(data: &[u8]) -> Result<SignatureProperty> {
    let mut parser = SignatureParser::new(data);
    parser.parse_property_signature()
}

/// Parse a local variable signature
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_local_var_signature(data: &[u8]) -> Result<SignatureLocalVariables> {
    let mut parser = SignatureParser::new(data);
    parser.parse_local_var_signature()
}

/// Parse a `TypeSpec` signature
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_type_spec_signature(data: &[u8]) -> Result<SignatureTypeSpec> {
    let mut parser = SignatureParser::new(data);
    parser.parse_type_spec_signature()
}

/// Parse a `MethodSpec` signature
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_method_spec_signature(data: &[u8]) -> Result<SignatureMethodSpec> {
    let mut parser = SignatureParser::new(data);
    parser.parse_method_spec_signature()
}

/// Parse a `StandAloneSig` blob
///
/// # Errors
/// Returns an error if the blob is malformed.
pub fn parse_standalone_signature(data: &[u8]) -> Result<StandAloneSignature> {
    let mut parser = SignatureParser::new(data);
    parser.parse_standalone_signature()
}

/// A signature as stored on a `MemberRef` row: a member reference points at either a field or a
/// method, distinguished by the first byte of the blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRefSignature {
    /// Reference to a field
    Field(SignatureField),
    /// Reference to a method
    Method(SignatureMethod),
}

impl MemberRefSignature {
    /// `true` if the referenced signature mentions a generic placeholder.
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        match self {
            MemberRefSignature::Field(field) => field.base.contains_generic_parameter(),
            MemberRefSignature::Method(method) => method.contains_generic_parameter(),
        }
    }

    /// Substitute generic placeholders in the signature.
    #[must_use]
    pub fn instantiate(&self, context: &crate::metadata::context::GenericContext) -> Self {
        match self {
            MemberRefSignature::Field(field) => MemberRefSignature::Field(field.instantiate(context)),
            MemberRefSignature::Method(method) => {
                MemberRefSignature::Method(method.instantiate(context))
            }
        }
    }
}

/// Parse the signature blob of a `MemberRef` row
///
/// # Errors
/// Returns an error if the blob is empty or malformed.
pub fn parse_member_ref_signature(data: &[u8]) -> Result<MemberRefSignature> {
    match data.first() {
        Some(0x06) => Ok(MemberRefSignature::Field(parse_field_signature(data)?)),
        Some(_) => Ok(MemberRefSignature::Method(parse_method_signature(data)?)),
        None => Err(malformed_error!("MemberRef signature is empty")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_ref_signature_kind() {
        let field = parse_member_ref_signature(&[0x06, 0x13, 0x00]).unwrap();
        assert!(matches!(field, MemberRefSignature::Field(_)));
        assert!(field.contains_generic_parameter());

        let method = parse_member_ref_signature(&[0x20, 0x00, 0x01]).unwrap();
        assert!(matches!(method, MemberRefSignature::Method(_)));
        assert!(!method.contains_generic_parameter());

        assert!(parse_member_ref_signature(&[]).is_err());
    }
}

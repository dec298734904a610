use crate::metadata::{context::GenericContext, token::Token};

/// Element type constants from ECMA-335 II.23.1.16, as they appear in signature blobs.
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    //Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    // Generic parameter in a generic type definition, represented as number
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    // Generic type instantiation. Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter in a generic method definition,represented as number
    pub const MVAR: u8 = 0x1e;
    // Required modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_OPT: u8 = 0x20;
    // Implemented within the CLI
    pub const INTERNAL: u8 = 0x21;
    // Or’d with following element types
    pub const MODIFIER: u8 = 0x40;
    // Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    // Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
}

/// Size and lower bound of one dimension of a general array.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ArrayDimensions {
    /// The size of this dimension
    pub size: Option<u32>,
    /// The lower bound of this dimension (lowest index that can be used to access an element)
    pub lower_bound: Option<u32>,
}

/// Represents a parsed type in various signatures
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeSignature {
    #[default]
    /// Not defined
    Unknown,
    /// void
    Void,
    /// bool
    Boolean,
    /// char
    Char,
    /// signed 8bit integer
    I1,
    /// unsigned 8bit integer
    U1,
    /// signed 16bit integer
    I2,
    /// unsigned 16bit integer
    U2,
    /// signed 32bit integer
    I4,
    /// unsigned 32bit integer
    U4,
    /// signed 64bit integer
    I8,
    /// unsigned 64bit integer
    U8,
    /// 32bit floating-point
    R4,
    /// 64bit floating-point
    R8,
    /// System.String
    String,
    /// A pointer to a type
    Ptr(SignaturePointer),
    /// Type by reference
    ByRef(Box<TypeSignature>),
    /// CIL value-type
    // TypeDefOrRefOrSpecEncoded
    ValueType(Token),
    /// CIL Class
    // TypeDefOrRefOrSpecEncoded
    Class(Token),
    /// Generic type parameter
    // Index into the declaring type's generic parameters
    GenericParamType(u32),
    /// Array
    Array(SignatureArray),
    /// Generic type and its arguments
    GenericInst(Box<TypeSignature>, Vec<TypeSignature>),
    /// Type is referenced during runtime
    TypedByRef,
    /// signed integer, sized to executing platform
    I,
    /// unsigned integer, sized to executing platform
    U,
    /// Function pointer
    FnPtr(Box<SignatureMethod>),
    /// System.Object
    Object,
    /// Single dimension array
    SzArray(SignatureSzArray),
    /// Generic method parameter
    // Index into the declaring method's generic parameters
    GenericParamMethod(u32),
    /// Required modifier
    // Token to TypeDef | TypeRef
    ModifiedRequired(Vec<Token>),
    /// Optional modifier
    // Token to TypeDef | TypeRef
    ModifiedOptional(Vec<Token>),
    /// Implemented within the CLI
    Internal,
    /// Or'd with following element types
    Modifier,
    /// Sentinel for vararg method signature
    Sentinel,
    /// A pinned type
    Pinned(Box<TypeSignature>),
}

/// A pointer to a 'flat' Array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureArray {
    /// The type in the array
    pub base: Box<TypeSignature>,
    /// The number of dimensions
    pub rank: u32,
    /// The dimensions (can be less than 'rank', are in order from 0..count)
    pub dimensions: Vec<ArrayDimensions>,
}

/// A single dimension, zero based array
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureSzArray {
    /// Custom modifiers - `TypeDefOrRefOrSpecEncoded`
    pub modifiers: Vec<Token>,
    /// The type in the array
    pub base: Box<TypeSignature>,
}

/// A pointer to a type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignaturePointer {
    /// Custom modifiers - `TypeDefOrRefOrSpecEncoded`
    pub modifiers: Vec<Token>,
    /// The type pointed to
    pub base: Box<TypeSignature>,
}

/// Parameter with optional custom modifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureParameter {
    /// Custom modifiers of the parameter - `TypeDefOrRefOrSpecEncoded`
    pub modifiers: Vec<Token>,
    /// Parameter is passed by reference
    pub by_ref: bool,
    /// The type of the parameter
    pub base: TypeSignature,
}

/// Represents a method signature (II.23.2.1)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SignatureMethod {
    /// Used to encode the keyword instance in the calling convention, see §II.15.3
    pub has_this: bool,
    /// Used to encode the keyword explicit in the calling convention, see §II.15.3
    pub explicit_this: bool,
    /// Used to encode the keyword default in the calling convention, see §II.15.3
    pub default: bool,
    /// Used to encode the keyword vararg in the calling convention, see §II.15.3
    pub vararg: bool,
    /// Used to indicate that the method has one or more generic parameters.
    pub param_count_generic: u32,
    /// Used to indicate the number of `Param` this `Method` has
    pub param_count: u32,
    /// The return type of this `Method`
    pub return_type: SignatureParameter,
    /// The parameters of this `Method`
    pub params: Vec<SignatureParameter>,
    /// The vararg parameters
    pub varargs: Vec<SignatureParameter>,
}

/// Field signature (II.23.2.4)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureField {
    /// The custom modifiers for this field - `TypeDefOrRefOrSpecEncoded`
    pub modifiers: Vec<Token>,
    /// The signature of this type
    pub base: TypeSignature,
}

/// Property signature (II.23.2.5)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureProperty {
    /// Indicates the passing of a 'this' pointer
    pub has_this: bool,
    /// The custom modifiers for this field - `TypeDefOrRefOrSpecEncoded`
    pub modifiers: Vec<Token>,
    /// The signature of this property
    pub base: TypeSignature,
    /// The parameters of this property
    pub params: Vec<SignatureParameter>,
}

/// Local variable signature (II.23.2.6)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureLocalVariables {
    /// The local variables
    pub locals: Vec<SignatureLocalVariable>,
}

/// Represents a local variable in a method body
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureLocalVariable {
    /// Custom modifiers
    pub modifiers: Vec<Token>,
    /// Is passed by reference
    pub is_byref: bool,
    /// This variable is pinned
    pub is_pinned: bool,
    /// The signature of this variable
    pub base: TypeSignature,
}

/// Type specification signature (II.23.2.14)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureTypeSpec {
    /// Signature of this type
    pub base: TypeSignature,
}

/// Represents a method specification (II.23.2.15)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SignatureMethodSpec {
    /// Types of the generic arguments
    pub generic_args: Vec<TypeSignature>,
}

/// A `StandAloneSig` blob: either a method signature (`calli` sites) or the locals of a body
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StandAloneSignature {
    /// `StandAloneMethodSig`
    Method(SignatureMethod),
    /// `LocalVarSig`
    LocalVariables(SignatureLocalVariables),
}

impl TypeSignature {
    /// `true` if this type still mentions a `!n` or `!!n` placeholder anywhere.
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        match self {
            TypeSignature::GenericParamType(_) | TypeSignature::GenericParamMethod(_) => true,
            TypeSignature::Ptr(ptr) => ptr.base.contains_generic_parameter(),
            TypeSignature::ByRef(inner) | TypeSignature::Pinned(inner) => {
                inner.contains_generic_parameter()
            }
            TypeSignature::Array(array) => array.base.contains_generic_parameter(),
            TypeSignature::SzArray(array) => array.base.contains_generic_parameter(),
            TypeSignature::GenericInst(base, args) => {
                base.contains_generic_parameter()
                    || args.iter().any(TypeSignature::contains_generic_parameter)
            }
            TypeSignature::FnPtr(method) => method.contains_generic_parameter(),
            _ => false,
        }
    }

    /// Substitute the generic placeholders this type mentions with the arguments of `context`.
    ///
    /// Placeholders without a matching argument are left untouched, so the result of
    /// instantiating under a partial context can still contain generic parameters.
    #[must_use]
    pub fn instantiate(&self, context: &GenericContext) -> TypeSignature {
        if context.is_empty() {
            return self.clone();
        }

        match self {
            TypeSignature::GenericParamType(index) => context
                .type_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSignature::GenericParamMethod(index) => context
                .method_args
                .get(*index as usize)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            TypeSignature::Ptr(ptr) => TypeSignature::Ptr(SignaturePointer {
                modifiers: ptr.modifiers.clone(),
                base: Box::new(ptr.base.instantiate(context)),
            }),
            TypeSignature::ByRef(inner) => TypeSignature::ByRef(Box::new(inner.instantiate(context))),
            TypeSignature::Pinned(inner) => {
                TypeSignature::Pinned(Box::new(inner.instantiate(context)))
            }
            TypeSignature::Array(array) => TypeSignature::Array(SignatureArray {
                base: Box::new(array.base.instantiate(context)),
                rank: array.rank,
                dimensions: array.dimensions.clone(),
            }),
            TypeSignature::SzArray(array) => TypeSignature::SzArray(SignatureSzArray {
                modifiers: array.modifiers.clone(),
                base: Box::new(array.base.instantiate(context)),
            }),
            TypeSignature::GenericInst(base, args) => TypeSignature::GenericInst(
                Box::new(base.instantiate(context)),
                args.iter().map(|arg| arg.instantiate(context)).collect(),
            ),
            TypeSignature::FnPtr(method) => {
                TypeSignature::FnPtr(Box::new(method.instantiate(context)))
            }
            other => other.clone(),
        }
    }

    /// Collects every `TypeDefOrRefOrSpec` token this type mentions, in order of appearance.
    pub fn collect_tokens(&self, tokens: &mut Vec<Token>) {
        match self {
            TypeSignature::ValueType(token) | TypeSignature::Class(token) => tokens.push(*token),
            TypeSignature::Ptr(ptr) => {
                tokens.extend_from_slice(&ptr.modifiers);
                ptr.base.collect_tokens(tokens);
            }
            TypeSignature::ByRef(inner) | TypeSignature::Pinned(inner) => {
                inner.collect_tokens(tokens);
            }
            TypeSignature::Array(array) => array.base.collect_tokens(tokens),
            TypeSignature::SzArray(array) => {
                tokens.extend_from_slice(&array.modifiers);
                array.base.collect_tokens(tokens);
            }
            TypeSignature::GenericInst(base, args) => {
                base.collect_tokens(tokens);
                for arg in args {
                    arg.collect_tokens(tokens);
                }
            }
            TypeSignature::FnPtr(method) => method.collect_tokens(tokens),
            TypeSignature::ModifiedRequired(mods) | TypeSignature::ModifiedOptional(mods) => {
                tokens.extend_from_slice(mods);
            }
            _ => {}
        }
    }
}

impl SignatureParameter {
    fn instantiate(&self, context: &GenericContext) -> SignatureParameter {
        SignatureParameter {
            modifiers: self.modifiers.clone(),
            by_ref: self.by_ref,
            base: self.base.instantiate(context),
        }
    }
}

impl SignatureMethod {
    /// `true` if the return type or any parameter mentions a generic placeholder.
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        self.return_type.base.contains_generic_parameter()
            || self
                .params
                .iter()
                .chain(self.varargs.iter())
                .any(|param| param.base.contains_generic_parameter())
    }

    /// Substitute generic placeholders in the return type and all parameters.
    #[must_use]
    pub fn instantiate(&self, context: &GenericContext) -> SignatureMethod {
        SignatureMethod {
            return_type: self.return_type.instantiate(context),
            params: self.params.iter().map(|p| p.instantiate(context)).collect(),
            varargs: self.varargs.iter().map(|p| p.instantiate(context)).collect(),
            ..self.clone()
        }
    }

    /// Collects every type token mentioned by the return type and the parameters.
    pub fn collect_tokens(&self, tokens: &mut Vec<Token>) {
        for param in std::iter::once(&self.return_type)
            .chain(self.params.iter())
            .chain(self.varargs.iter())
        {
            tokens.extend_from_slice(&param.modifiers);
            param.base.collect_tokens(tokens);
        }
    }
}

impl SignatureField {
    /// Substitute generic placeholders in the field type.
    #[must_use]
    pub fn instantiate(&self, context: &GenericContext) -> SignatureField {
        SignatureField {
            modifiers: self.modifiers.clone(),
            base: self.base.instantiate(context),
        }
    }
}

impl SignatureMethodSpec {
    /// `true` if any generic argument mentions a generic placeholder.
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        self.generic_args
            .iter()
            .any(TypeSignature::contains_generic_parameter)
    }

    /// Substitute generic placeholders in every generic argument.
    #[must_use]
    pub fn instantiate(&self, context: &GenericContext) -> SignatureMethodSpec {
        SignatureMethodSpec {
            generic_args: self
                .generic_args
                .iter()
                .map(|arg| arg.instantiate(context))
                .collect(),
        }
    }
}

impl StandAloneSignature {
    /// `true` if the signature mentions a generic placeholder.
    #[must_use]
    pub fn contains_generic_parameter(&self) -> bool {
        match self {
            StandAloneSignature::Method(method) => method.contains_generic_parameter(),
            StandAloneSignature::LocalVariables(locals) => locals
                .locals
                .iter()
                .any(|local| local.base.contains_generic_parameter()),
        }
    }

    /// Substitute generic placeholders in the signature.
    #[must_use]
    pub fn instantiate(&self, context: &GenericContext) -> StandAloneSignature {
        match self {
            StandAloneSignature::Method(method) => {
                StandAloneSignature::Method(method.instantiate(context))
            }
            StandAloneSignature::LocalVariables(locals) => {
                StandAloneSignature::LocalVariables(SignatureLocalVariables {
                    locals: locals
                        .locals
                        .iter()
                        .map(|local| SignatureLocalVariable {
                            base: local.base.instantiate(context),
                            ..local.clone()
                        })
                        .collect(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_of(arg: TypeSignature) -> TypeSignature {
        TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(Token::new(0x0100_0001))),
            vec![arg],
        )
    }

    #[test]
    fn test_contains_generic_parameter() {
        assert!(!TypeSignature::I4.contains_generic_parameter());
        assert!(TypeSignature::GenericParamType(0).contains_generic_parameter());
        assert!(list_of(TypeSignature::GenericParamMethod(1)).contains_generic_parameter());
        assert!(TypeSignature::SzArray(SignatureSzArray {
            modifiers: vec![],
            base: Box::new(TypeSignature::GenericParamType(0)),
        })
        .contains_generic_parameter());
        assert!(!list_of(TypeSignature::String).contains_generic_parameter());
    }

    #[test]
    fn test_instantiate_full_context() {
        let context = GenericContext::new(vec![TypeSignature::String], vec![TypeSignature::I8]);

        let open = list_of(TypeSignature::GenericParamType(0));
        let closed = open.instantiate(&context);
        assert_eq!(closed, list_of(TypeSignature::String));
        assert!(!closed.contains_generic_parameter());

        let method_arg = TypeSignature::ByRef(Box::new(TypeSignature::GenericParamMethod(0)));
        assert_eq!(
            method_arg.instantiate(&context),
            TypeSignature::ByRef(Box::new(TypeSignature::I8))
        );
    }

    #[test]
    fn test_instantiate_partial_context_stays_open() {
        let context = GenericContext::for_type(vec![TypeSignature::String]);
        let open = list_of(TypeSignature::GenericParamType(1));
        assert!(open.instantiate(&context).contains_generic_parameter());
    }

    #[test]
    fn test_method_signature_instantiate() {
        let method = SignatureMethod {
            has_this: true,
            param_count: 1,
            return_type: SignatureParameter {
                base: TypeSignature::GenericParamType(0),
                ..Default::default()
            },
            params: vec![SignatureParameter {
                base: TypeSignature::I4,
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(method.contains_generic_parameter());

        let closed = method.instantiate(&GenericContext::for_type(vec![TypeSignature::Object]));
        assert!(!closed.contains_generic_parameter());
        assert_eq!(closed.return_type.base, TypeSignature::Object);
        assert!(closed.has_this);
    }

    #[test]
    fn test_collect_tokens() {
        let sig = TypeSignature::GenericInst(
            Box::new(TypeSignature::Class(Token::new(0x0100_0001))),
            vec![
                TypeSignature::ValueType(Token::new(0x0200_0003)),
                TypeSignature::Class(Token::new(0x1B00_0002)),
            ],
        );
        let mut tokens = Vec::new();
        sig.collect_tokens(&mut tokens);
        assert_eq!(
            tokens,
            vec![
                Token::new(0x0100_0001),
                Token::new(0x0200_0003),
                Token::new(0x1B00_0002)
            ]
        );
    }
}

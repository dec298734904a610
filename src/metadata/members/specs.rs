//! Rows whose meaning depends on the generic context they are resolved under.

use std::sync::Arc;

use crate::metadata::{
    context::GenericContext,
    import::{
        GenericParamConstraintRaw, InterfaceImplRaw, MemberRefRaw, MethodSpecRaw,
        StandAloneSigRaw, TypeSpecRaw,
    },
    members::absent_on_error,
    module::ModuleView,
    object::{ContainsGenericParameter, MetadataObject},
    signatures::{
        parse_member_ref_signature, parse_method_spec_signature, parse_standalone_signature,
        parse_type_spec_signature, MemberRefSignature, SignatureMethodSpec, StandAloneSignature,
        TypeSignature,
    },
    tableid::TableId,
    token::Token,
};

/// A reference to a `TypeSpec`
pub type TypeSpecRc = Arc<TypeSpec>;
/// A reference to a `MemberRef`
pub type MemberRefRc = Arc<MemberRef>;
/// A reference to a `MethodSpec`
pub type MethodSpecRc = Arc<MethodSpec>;
/// A reference to a `StandAloneSig`
pub type StandAloneSigRc = Arc<StandAloneSig>;
/// A reference to an `InterfaceImpl`
pub type InterfaceImplRc = Arc<InterfaceImpl>;
/// A reference to a `GenericParamConstraint`
pub type GenericParamConstraintRc = Arc<GenericParamConstraint>;

fn any_open(objects: &[MetadataObject]) -> bool {
    objects
        .iter()
        .any(ContainsGenericParameter::contains_generic_parameter)
}

fn open(object: Option<&MetadataObject>) -> bool {
    object.is_some_and(ContainsGenericParameter::contains_generic_parameter)
}

/// A type specification, instantiated under a generic context
#[derive(Debug)]
pub struct TypeSpec {
    /// Token
    pub token: Token,
    /// The context this instance was built under
    pub context: GenericContext,
    /// The instantiated signature; `None` if the blob could not be parsed
    pub signature: Option<TypeSignature>,
    /// Other type specifications mentioned by the blob, resolved under the same context
    pub referenced: Vec<MetadataObject>,
}

impl TypeSpec {
    pub(crate) fn build(module: &ModuleView, raw: TypeSpecRaw, context: &GenericContext) -> Self {
        let parsed = absent_on_error(
            raw.token,
            "signature",
            parse_type_spec_signature(&raw.signature).map(Some),
        );

        let mut referenced = Vec::new();
        if let Some(spec) = &parsed {
            let mut tokens = Vec::new();
            spec.base.collect_tokens(&mut tokens);
            for token in tokens {
                if !token.is_row_of(TableId::TypeSpec) {
                    continue;
                }
                // A spec under construction (including this one) resolves to nothing here
                if let Some(object) = module.resolve(token, context) {
                    referenced.push(object);
                }
            }
        }

        TypeSpec {
            token: raw.token,
            context: context.clone(),
            signature: parsed.map(|spec| spec.base.instantiate(context)),
            referenced,
        }
    }
}

impl ContainsGenericParameter for TypeSpec {
    fn contains_generic_parameter(&self) -> bool {
        self.signature
            .as_ref()
            .is_some_and(TypeSignature::contains_generic_parameter)
            || any_open(&self.referenced)
    }
}

/// A reference to a field or method of another type
#[derive(Debug)]
pub struct MemberRef {
    /// Token
    pub token: Token,
    /// The context this instance was built under
    pub context: GenericContext,
    /// Raw token of the declaring type, module or method
    pub class: Token,
    /// The resolved declaring object
    pub parent: Option<MetadataObject>,
    /// Name of the member
    pub name: String,
    /// The instantiated signature; `None` if the blob could not be parsed
    pub signature: Option<MemberRefSignature>,
}

impl MemberRef {
    pub(crate) fn build(module: &ModuleView, raw: MemberRefRaw, context: &GenericContext) -> Self {
        let signature = absent_on_error(
            raw.token,
            "signature",
            parse_member_ref_signature(&raw.signature).map(Some),
        );

        MemberRef {
            token: raw.token,
            context: context.clone(),
            class: raw.class,
            parent: module.resolve(raw.class, context),
            name: raw.name,
            signature: signature.map(|sig| sig.instantiate(context)),
        }
    }

    /// `true` if the member is a field
    pub fn is_field(&self) -> bool {
        matches!(self.signature, Some(MemberRefSignature::Field(_)))
    }
}

impl ContainsGenericParameter for MemberRef {
    fn contains_generic_parameter(&self) -> bool {
        self.signature
            .as_ref()
            .is_some_and(MemberRefSignature::contains_generic_parameter)
            || open(self.parent.as_ref())
    }
}

/// An instantiation of a generic method
#[derive(Debug)]
pub struct MethodSpec {
    /// Token
    pub token: Token,
    /// The context this instance was built under
    pub context: GenericContext,
    /// The generic method, a `MethodDef` or `MemberRef`
    pub method: Option<MetadataObject>,
    /// The instantiated generic arguments; `None` if the blob could not be parsed
    pub instantiation: Option<SignatureMethodSpec>,
}

impl MethodSpec {
    pub(crate) fn build(module: &ModuleView, raw: MethodSpecRaw, context: &GenericContext) -> Self {
        let instantiation = absent_on_error(
            raw.token,
            "instantiation",
            parse_method_spec_signature(&raw.instantiation).map(Some),
        );

        MethodSpec {
            token: raw.token,
            context: context.clone(),
            method: module.resolve(raw.method, context),
            instantiation: instantiation.map(|spec| spec.instantiate(context)),
        }
    }
}

impl ContainsGenericParameter for MethodSpec {
    fn contains_generic_parameter(&self) -> bool {
        self.instantiation
            .as_ref()
            .is_some_and(SignatureMethodSpec::contains_generic_parameter)
            || open(self.method.as_ref())
    }
}

/// A stand-alone signature: locals of a body or a `calli` site
#[derive(Debug)]
pub struct StandAloneSig {
    /// Token
    pub token: Token,
    /// The context this instance was built under
    pub context: GenericContext,
    /// The instantiated signature; `None` if the blob could not be parsed
    pub signature: Option<StandAloneSignature>,
}

impl StandAloneSig {
    pub(crate) fn build(raw: StandAloneSigRaw, context: &GenericContext) -> Self {
        let signature = absent_on_error(
            raw.token,
            "signature",
            parse_standalone_signature(&raw.signature).map(Some),
        );

        StandAloneSig {
            token: raw.token,
            context: context.clone(),
            signature: signature.map(|sig| sig.instantiate(context)),
        }
    }
}

impl ContainsGenericParameter for StandAloneSig {
    fn contains_generic_parameter(&self) -> bool {
        self.signature
            .as_ref()
            .is_some_and(StandAloneSignature::contains_generic_parameter)
    }
}

/// An interface implemented by a type
#[derive(Debug)]
pub struct InterfaceImpl {
    /// Token
    pub token: Token,
    /// The context this instance was built under
    pub context: GenericContext,
    /// The implementing `TypeDef`
    pub class: Token,
    /// The resolved interface
    pub interface: Option<MetadataObject>,
}

impl InterfaceImpl {
    pub(crate) fn build(
        module: &ModuleView,
        raw: InterfaceImplRaw,
        context: &GenericContext,
    ) -> Self {
        InterfaceImpl {
            token: raw.token,
            context: context.clone(),
            class: raw.class,
            interface: module.resolve(raw.interface, context),
        }
    }
}

impl ContainsGenericParameter for InterfaceImpl {
    fn contains_generic_parameter(&self) -> bool {
        open(self.interface.as_ref())
    }
}

/// A constraint on a generic parameter
#[derive(Debug)]
pub struct GenericParamConstraint {
    /// Token
    pub token: Token,
    /// The context this instance was built under
    pub context: GenericContext,
    /// The constrained `GenericParam`
    pub owner: Token,
    /// The resolved constraint type
    pub constraint: Option<MetadataObject>,
}

impl GenericParamConstraint {
    pub(crate) fn build(
        module: &ModuleView,
        raw: GenericParamConstraintRaw,
        context: &GenericContext,
    ) -> Self {
        GenericParamConstraint {
            token: raw.token,
            context: context.clone(),
            owner: raw.owner,
            constraint: module.resolve(raw.constraint, context),
        }
    }
}

impl ContainsGenericParameter for GenericParamConstraint {
    fn contains_generic_parameter(&self) -> bool {
        open(self.constraint.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::import::RawRow,
        test::{static_module, MetadataBuilder},
    };

    // GENERICINST CLASS TypeDef(1) 1 VAR(0)
    const LIST_OF_T: [u8; 6] = [0x15, 0x12, 0x04, 0x01, 0x13, 0x00];

    #[test]
    fn test_member_ref_on_generic_instantiation() {
        let builder = MetadataBuilder::new();
        let list = builder.type_def(1, "App", "List`1");
        let spec = builder.type_spec(1, LIST_OF_T.to_vec());
        // HASTHIS, 1 param, void (!0)
        builder.import().insert(RawRow::MemberRef(MemberRefRaw {
            token: Token::from_parts(TableId::MemberRef, 1),
            class: spec,
            name: "Add".to_string(),
            signature: vec![0x20, 0x01, 0x01, 0x13, 0x00],
        }));
        let view = static_module(&builder);

        let open = view.resolve_member_ref(1, &GenericContext::empty()).unwrap();
        assert_eq!(open.name, "Add");
        assert!(!open.is_field());
        assert!(open.contains_generic_parameter());

        let context = GenericContext::for_type(vec![TypeSignature::I4]);
        let closed = view.resolve_member_ref(1, &context).unwrap();
        assert!(!closed.contains_generic_parameter());

        let Some(MemberRefSignature::Method(method)) = &closed.signature else {
            panic!("expected a method signature");
        };
        assert_eq!(method.params[0].base, TypeSignature::I4);

        let Some(MetadataObject::TypeSpec(parent)) = &closed.parent else {
            panic!("expected a TypeSpec parent");
        };
        assert_eq!(
            parent.signature,
            Some(TypeSignature::GenericInst(
                Box::new(TypeSignature::Class(list)),
                vec![TypeSignature::I4]
            ))
        );
    }

    #[test]
    fn test_field_member_ref() {
        let builder = MetadataBuilder::new();
        let object = builder.type_ref(1, "System", "String");
        builder.import().insert(RawRow::MemberRef(MemberRefRaw {
            token: Token::from_parts(TableId::MemberRef, 1),
            class: object,
            name: "Empty".to_string(),
            signature: vec![0x06, 0x0E],
        }));
        let view = static_module(&builder);

        let empty = view.resolve_member_ref(1, &GenericContext::empty()).unwrap();
        assert!(empty.is_field());
        assert!(!empty.contains_generic_parameter());
        assert!(matches!(empty.parent, Some(MetadataObject::TypeRef(_))));
    }

    #[test]
    fn test_method_spec_instantiation() {
        let builder = MetadataBuilder::new();
        let program = builder.type_def(1, "App", "Program");
        let create = builder.method(program, 1, "Create");
        // GENERICINST 1 MVAR(0)
        builder.import().insert(RawRow::MethodSpec(MethodSpecRaw {
            token: Token::from_parts(TableId::MethodSpec, 1),
            method: create,
            instantiation: vec![0x0A, 0x01, 0x1E, 0x00],
        }));
        let view = static_module(&builder);

        let open = view.resolve_method_spec(1, &GenericContext::empty()).unwrap();
        assert!(open.contains_generic_parameter());

        let context = GenericContext::for_method(vec![TypeSignature::String]);
        let closed = view.resolve_method_spec(1, &context).unwrap();
        assert!(!closed.contains_generic_parameter());
        assert_eq!(
            closed.instantiation.as_ref().unwrap().generic_args,
            vec![TypeSignature::String]
        );

        let Some(MetadataObject::Method(method)) = &closed.method else {
            panic!("expected a MethodDef");
        };
        assert_eq!(method.name(), "Create");
    }

    #[test]
    fn test_standalone_locals() {
        let builder = MetadataBuilder::new();
        // LOCAL_SIG 2 locals: int32, !!0
        builder.import().insert(RawRow::StandAloneSig(StandAloneSigRaw {
            token: Token::from_parts(TableId::StandAloneSig, 1),
            signature: vec![0x07, 0x02, 0x08, 0x1E, 0x00],
        }));
        let view = static_module(&builder);

        let open = view.resolve_standalone_sig(1, &GenericContext::empty()).unwrap();
        assert!(open.contains_generic_parameter());

        let context = GenericContext::for_method(vec![TypeSignature::Boolean]);
        let closed = view.resolve_standalone_sig(1, &context).unwrap();
        let Some(StandAloneSignature::LocalVariables(locals)) = &closed.signature else {
            panic!("expected locals");
        };
        let types: Vec<_> = locals.locals.iter().map(|local| local.base.clone()).collect();
        assert_eq!(types, vec![TypeSignature::I4, TypeSignature::Boolean]);
    }

    #[test]
    fn test_interface_and_constraint_follow_context() {
        let builder = MetadataBuilder::new();
        let list = builder.type_def(1, "App", "List`1");
        let spec = builder.type_spec(1, LIST_OF_T.to_vec());
        let import = builder.import();
        import.insert(RawRow::InterfaceImpl(InterfaceImplRaw {
            token: Token::from_parts(TableId::InterfaceImpl, 1),
            class: list,
            interface: spec,
        }));
        import.insert(RawRow::GenericParamConstraint(GenericParamConstraintRaw {
            token: Token::from_parts(TableId::GenericParamConstraint, 1),
            owner: Token::from_parts(TableId::GenericParam, 1),
            constraint: spec,
        }));
        let view = static_module(&builder);
        let closed = GenericContext::for_type(vec![TypeSignature::I4]);

        let interface = view.resolve_interface_impl(1, &GenericContext::empty()).unwrap();
        assert_eq!(interface.class, list);
        assert!(interface.contains_generic_parameter());
        assert!(!view
            .resolve_interface_impl(1, &closed)
            .unwrap()
            .contains_generic_parameter());

        let constraint = view
            .resolve_generic_param_constraint(1, &GenericContext::empty())
            .unwrap();
        assert!(constraint.contains_generic_parameter());
        assert!(!view
            .resolve_generic_param_constraint(1, &closed)
            .unwrap()
            .contains_generic_parameter());
    }
}

//! Logger field discovery

use crate::config::FieldPattern;
use logweave_il::{FieldDef, FieldRef, TypeDef, Visibility};

/// First field of `ty` that carries the logger
///
/// The field must be private, assign-once, non-static, and typed as an
/// instance of the pattern's open generic type. Types without methods or
/// without fields yield nothing.
pub fn find_logger_field<'a>(ty: &'a TypeDef, pattern: &FieldPattern) -> Option<&'a FieldDef> {
    if !ty.has_methods() || ty.fields.is_empty() {
        return None;
    }

    ty.fields.iter().find(|field| {
        field.visibility == Visibility::Private
            && field.is_init_only
            && !field.is_static
            && pattern.matches(&field.field_type)
    })
}

/// Field reference for loading `field` from inside `ty`'s own methods
pub fn field_ref(ty: &TypeDef, field: &FieldDef) -> FieldRef {
    FieldRef {
        declaring_type: ty.self_type(),
        name: field.name.clone(),
        field_type: field.field_type.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logweave_il::{MethodBody, MethodDef, TypeName, TypeSig};

    fn logger_type(arg: TypeSig) -> TypeSig {
        TypeSig::GenericInst {
            definition: TypeName::new("Microsoft.Extensions.Logging", "ILogger`1"),
            value_type: false,
            args: vec![arg],
        }
    }

    fn field(name: &str, field_type: TypeSig) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            field_type,
            visibility: Visibility::Private,
            is_static: false,
            is_init_only: true,
        }
    }

    fn worker(fields: Vec<FieldDef>) -> TypeDef {
        let mut ty = TypeDef::new("App", "Worker");
        ty.fields = fields;
        ty.methods.push(MethodDef {
            name: "Run".to_string(),
            visibility: Visibility::Public,
            is_static: false,
            generic_params: Vec::new(),
            params: Vec::new(),
            return_type: TypeSig::Void,
            body: Some(MethodBody::from_instructions(vec![logweave_il::Instruction::ret()]).unwrap()),
        });
        ty
    }

    #[test]
    fn test_finds_private_readonly_logger() {
        let ty = worker(vec![
            field("_name", TypeSig::String),
            field("_logger", logger_type(TypeSig::class("App", "Worker"))),
        ]);
        let found = find_logger_field(&ty, &FieldPattern::default()).unwrap();
        assert_eq!(found.name, "_logger");
    }

    #[test]
    fn test_first_match_wins() {
        let ty = worker(vec![
            field("_primary", logger_type(TypeSig::class("App", "Worker"))),
            field("_secondary", logger_type(TypeSig::Object)),
        ]);
        let found = find_logger_field(&ty, &FieldPattern::default()).unwrap();
        assert_eq!(found.name, "_primary");
    }

    #[test]
    fn test_rejects_public_mutable_or_static() {
        let logger = logger_type(TypeSig::class("App", "Worker"));

        let mut public = field("_logger", logger.clone());
        public.visibility = Visibility::Public;
        let mut mutable = field("_logger", logger.clone());
        mutable.is_init_only = false;
        let mut shared = field("_logger", logger);
        shared.is_static = true;

        for candidate in [public, mutable, shared] {
            let ty = worker(vec![candidate]);
            assert!(find_logger_field(&ty, &FieldPattern::default()).is_none());
        }
    }

    #[test]
    fn test_rejects_non_generic_logger() {
        let ty = worker(vec![field(
            "_logger",
            TypeSig::class("Microsoft.Extensions.Logging", "ILogger"),
        )]);
        assert!(find_logger_field(&ty, &FieldPattern::default()).is_none());
    }

    #[test]
    fn test_type_without_methods_is_skipped() {
        let mut ty = worker(vec![field("_logger", logger_type(TypeSig::Object))]);
        ty.methods.clear();
        assert!(find_logger_field(&ty, &FieldPattern::default()).is_none());
    }

    #[test]
    fn test_field_ref_on_generic_type() {
        let mut ty = worker(vec![field("_logger", logger_type(TypeSig::Var(0)))]);
        ty.name = "Repository`1".to_string();
        ty.generic_params.push("T".to_string());

        let field = find_logger_field(&ty, &FieldPattern::default()).unwrap();
        let reference = field_ref(&ty, field);
        assert_eq!(
            reference.full_name(),
            "Microsoft.Extensions.Logging.ILogger`1<!0> App.Repository`1<!0>::_logger"
        );
    }
}

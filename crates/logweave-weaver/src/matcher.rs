//! Signature matcher
//!
//! Locates the logging callable inside the modules the rewritten module
//! references. Matching is structural: declaring type, method name,
//! staticness, generic arity and the full names of the leading parameters.
//! References are searched in declaration order and the first match wins.

use crate::config::CallablePattern;
use crate::error::MatchError;
use crate::report::WeaveReport;
use crate::resolver::ModuleResolver;
use logweave_il::{MethodDef, MethodRef, Module, TypeDef};
use tracing::{debug, trace};

/// Whether `method` has the pattern's shape
///
/// Generic overloads with the same name are rejected by requiring zero
/// generic parameters.
pub fn is_logging_callable(method: &MethodDef, pattern: &CallablePattern) -> bool {
    method.is_static
        && !method.is_generic()
        && method.name == pattern.method
        && method.params.len() >= pattern.parameters.len()
        && method
            .params
            .iter()
            .zip(&pattern.parameters)
            .all(|(param, expected)| param.param_type.full_name() == *expected)
}

/// Reference to `method` as seen from the rewritten module
fn import(module: &Module, declaring: &TypeDef, method: &MethodDef) -> MethodRef {
    MethodRef {
        scope: Some(module.name.clone()),
        declaring_type: declaring.self_type(),
        name: method.name.clone(),
        has_this: !method.is_static,
        params: method.params.iter().map(|p| p.param_type.clone()).collect(),
        return_type: method.return_type.clone(),
        generic_args: Vec::new(),
    }
}

/// Find the first matching method in one resolved module
pub fn find_in_module(module: &Module, pattern: &CallablePattern) -> Option<MethodRef> {
    module
        .types
        .iter()
        .filter(|ty| ty.namespace == pattern.namespace && ty.name == pattern.declaring_type)
        .find_map(|ty| {
            ty.methods
                .iter()
                .find(|method| is_logging_callable(method, pattern))
                .map(|method| import(module, ty, method))
        })
}

/// Find the logging callable across the references of `module`
///
/// A reference that fails to resolve is recorded as a warning and skipped.
/// On success an info diagnostic names the module the callable came from.
pub fn find_logging_callable<R: ModuleResolver + ?Sized>(
    module: &Module,
    resolver: &R,
    pattern: &CallablePattern,
    report: &mut WeaveReport,
) -> Result<MethodRef, MatchError> {
    for reference in &module.references {
        let resolved = match resolver.resolve(reference) {
            Ok(resolved) => resolved,
            Err(err) => {
                report.warning(format!("Skipping reference {}: {}", reference.name, err));
                continue;
            }
        };
        trace!(module = %resolved.name, types = resolved.types.len(), "scanning reference");

        if let Some(callable) = find_in_module(&resolved, pattern) {
            report.info(format!(
                "Found correct {} method in {}",
                pattern.method, resolved.name
            ));
            debug!(callable = %callable.full_name(), "resolved logging callable");
            return Ok(callable);
        }
    }

    Err(MatchError::NotFound {
        signature: pattern.signature(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::DiagnosticLevel;
    use crate::resolver::MemoryResolver;
    use logweave_il::{ModuleReference, ParamDef, TypeSig, Visibility};

    fn log_information(generic: bool, params: Vec<TypeSig>) -> MethodDef {
        MethodDef {
            name: "LogInformation".to_string(),
            visibility: Visibility::Public,
            is_static: true,
            generic_params: if generic { vec!["T0".to_string()] } else { Vec::new() },
            params: params
                .into_iter()
                .enumerate()
                .map(|(i, ty)| ParamDef::new(format!("p{}", i), ty))
                .collect(),
            return_type: TypeSig::Void,
            body: None,
        }
    }

    fn standard_params() -> Vec<TypeSig> {
        vec![
            TypeSig::class("Microsoft.Extensions.Logging", "ILogger"),
            TypeSig::String,
            TypeSig::object_array(),
        ]
    }

    fn abstractions(methods: Vec<MethodDef>) -> Module {
        let mut ty = TypeDef::new("Microsoft.Extensions.Logging", "LoggerExtensions");
        ty.methods = methods;
        let mut module = Module::new("Microsoft.Extensions.Logging.Abstractions");
        module.types.push(ty);
        module
    }

    fn referencing(names: &[&str]) -> Module {
        let mut module = Module::new("App");
        module.references = names.iter().map(|n| ModuleReference::new(*n)).collect();
        module
    }

    #[test]
    fn test_generic_overload_is_excluded() {
        let pattern = CallablePattern::default();
        assert!(!is_logging_callable(&log_information(true, standard_params()), &pattern));
        assert!(is_logging_callable(&log_information(false, standard_params()), &pattern));
    }

    #[test]
    fn test_instance_method_is_excluded() {
        let mut method = log_information(false, standard_params());
        method.is_static = false;
        assert!(!is_logging_callable(&method, &CallablePattern::default()));
    }

    #[test]
    fn test_parameter_prefix_must_match() {
        let pattern = CallablePattern::default();
        let mut params = standard_params();
        params.insert(1, TypeSig::value_type("Microsoft.Extensions.Logging", "EventId"));
        assert!(!is_logging_callable(&log_information(false, params), &pattern));

        let mut extra = standard_params();
        extra.push(TypeSig::I4);
        assert!(is_logging_callable(&log_information(false, extra), &pattern));

        assert!(!is_logging_callable(
            &log_information(false, standard_params()[..2].to_vec()),
            &pattern
        ));
    }

    #[test]
    fn test_closed_generic_logger_parameter_is_rejected() {
        let mut params = standard_params();
        params[0] = TypeSig::GenericInst {
            definition: logweave_il::TypeName::new("Microsoft.Extensions.Logging", "ILogger`1"),
            value_type: false,
            args: vec![TypeSig::Object],
        };
        assert!(!is_logging_callable(
            &log_information(false, params),
            &CallablePattern::default()
        ));
    }

    #[test]
    fn test_first_match_in_declaration_order() {
        let methods = vec![
            log_information(true, standard_params()),
            log_information(false, standard_params()),
        ];
        let resolver = MemoryResolver::new().with_module(abstractions(methods));
        let module = referencing(&["Microsoft.Extensions.Logging.Abstractions"]);
        let mut report = WeaveReport::new();

        let callable =
            find_logging_callable(&module, &resolver, &CallablePattern::default(), &mut report)
                .unwrap();

        assert_eq!(
            callable.scope.as_deref(),
            Some("Microsoft.Extensions.Logging.Abstractions")
        );
        assert!(callable.generic_args.is_empty());
        assert!(!callable.has_this);
        assert_eq!(
            report.messages(DiagnosticLevel::Info).collect::<Vec<_>>(),
            vec!["Found correct LogInformation method in Microsoft.Extensions.Logging.Abstractions"]
        );
    }

    #[test]
    fn test_unresolvable_reference_is_skipped() {
        let resolver = MemoryResolver::new().with_module(abstractions(vec![log_information(
            false,
            standard_params(),
        )]));
        let module = referencing(&["Missing", "Microsoft.Extensions.Logging.Abstractions"]);
        let mut report = WeaveReport::new();

        let result =
            find_logging_callable(&module, &resolver, &CallablePattern::default(), &mut report);

        assert!(result.is_ok());
        assert_eq!(report.messages(DiagnosticLevel::Warning).count(), 1);
    }

    #[test]
    fn test_not_found() {
        let resolver = MemoryResolver::new();
        let module = referencing(&[]);
        let mut report = WeaveReport::new();

        let err = find_logging_callable(&module, &resolver, &CallablePattern::default(), &mut report)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not locate non-generic LoggerExtensions.LogInformation(ILogger, string, object[])"
        );
    }
}

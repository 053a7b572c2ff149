//! Instruction synthesis
//!
//! Builds the logging sequences spliced into method bodies. Synthesis only
//! reads the target method; every sequence is built fresh for its injection
//! point and never shared.

use crate::error::{HelperError, WeaveError, WeaveResult};
use crate::resolver::ModuleResolver;
use logweave_il::{
    stack_effect, FieldRef, Instruction, MethodDef, MethodRef, Module, ModuleReference, Opcode,
    TypeKind, TypeSig, VerifyError,
};
use tracing::debug;

/// A synthesized instruction sequence and the locals it needs
#[derive(Debug, Clone, PartialEq)]
pub struct InjectionSequence {
    /// Instructions, in execution order
    pub instructions: Vec<Instruction>,
    /// Local slots to append to the method, in slot order
    pub new_locals: Vec<TypeSig>,
}

impl InjectionSequence {
    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Whether the sequence is empty
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Peak stack depth the sequence adds on top of whatever is below it
    ///
    /// Fails on an instruction whose stack effect cannot be determined.
    pub fn max_depth(&self) -> Result<usize, VerifyError> {
        let mut depth = 0usize;
        let mut peak = 0usize;
        for (position, instr) in self.instructions.iter().enumerate() {
            let (pops, pushes) = stack_effect(instr, false, position)?;
            depth = depth.saturating_sub(pops) + pushes;
            peak = peak.max(depth);
        }
        Ok(peak)
    }
}

/// `"a={0}, b={1}"` for the given parameter names
pub fn format_string(method: &MethodDef) -> String {
    method
        .params
        .iter()
        .enumerate()
        .map(|(ordinal, param)| format!("{}={{{}}}", param.name, ordinal))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Instructions converting the value on the stack into an object reference
///
/// By-ref parameters are dereferenced first. Value-kind types are boxed,
/// reference-kind types are upcast.
fn to_object(param_type: &TypeSig) -> Vec<Instruction> {
    let mut instrs = Vec::with_capacity(2);
    let value_type = match param_type {
        TypeSig::ByRef(element) => {
            instrs.push(Instruction::with_type(Opcode::Ldobj, (**element).clone()));
            (**element).clone()
        }
        other => other.clone(),
    };
    match value_type.kind() {
        TypeKind::Value => instrs.push(Instruction::with_type(Opcode::Box, value_type)),
        TypeKind::Reference => {
            instrs.push(Instruction::with_type(Opcode::Castclass, TypeSig::Object))
        }
    }
    instrs
}

/// Build the entry sequence for `method`
///
/// Packs every formal parameter into a fresh `object[]` local (allocated at
/// the method's current local count) and passes it, with the format string,
/// to `callable` on the logger loaded from `this`.
pub fn build_entry_sequence(
    method: &MethodDef,
    logger: &FieldRef,
    callable: &MethodRef,
) -> WeaveResult<InjectionSequence> {
    let too_many_params = || WeaveError::TooManyParameters {
        method: method.name.clone(),
    };
    let count = i32::try_from(method.params.len()).map_err(|_| too_many_params())?;
    let slot = method.body.as_ref().map_or(0, |body| body.locals.len());
    let slot = u16::try_from(slot).map_err(|_| {
        WeaveError::Splice(crate::error::SpliceError::TooManyLocals {
            method: method.name.clone(),
        })
    })?;

    let mut instrs = vec![
        Instruction::ldarg(0),
        Instruction::ldfld(logger.clone()),
        Instruction::ldstr(format_string(method)),
        Instruction::ldc_i4(count),
        Instruction::with_type(Opcode::Newarr, TypeSig::Object),
        Instruction::stloc(slot),
    ];

    for (ordinal, param) in method.params.iter().enumerate() {
        let argument = u16::try_from(ordinal + 1).map_err(|_| too_many_params())?;
        let index = i32::try_from(ordinal).map_err(|_| too_many_params())?;
        instrs.push(Instruction::ldloc(slot));
        instrs.push(Instruction::ldc_i4(index));
        instrs.push(Instruction::ldarg(argument));
        instrs.extend(to_object(&param.param_type));
        instrs.push(Instruction::simple(Opcode::StelemRef));
    }

    instrs.push(Instruction::ldloc(slot));
    instrs.push(Instruction::call(callable.clone()));

    Ok(InjectionSequence {
        instructions: instrs,
        new_locals: vec![TypeSig::object_array()],
    })
}

/// Build one exit sequence: the exit message with an empty argument array
pub fn build_exit_sequence(
    logger: &FieldRef,
    callable: &MethodRef,
    empty_array: &MethodRef,
    message: &str,
) -> InjectionSequence {
    InjectionSequence {
        instructions: vec![
            Instruction::ldarg(0),
            Instruction::ldfld(logger.clone()),
            Instruction::ldstr(message),
            Instruction::call(empty_array.clone()),
            Instruction::call(callable.clone()),
        ],
        new_locals: Vec::new(),
    }
}

/// Locate `System.Array::Empty<T>()` and specialize it for `System.Object`
///
/// Candidate modules are the module's core library followed by
/// `scan_modules`; the first that resolves and defines `System.Array` is
/// used.
pub fn find_empty_array_method<R: ModuleResolver + ?Sized>(
    module: &Module,
    resolver: &R,
    scan_modules: &[String],
) -> Result<MethodRef, HelperError> {
    let mut candidates: Vec<&str> = Vec::new();
    for name in module.core_library.iter().chain(scan_modules) {
        if !candidates.contains(&name.as_str()) {
            candidates.push(name);
        }
    }

    let (scope, array_type) = candidates
        .into_iter()
        .filter_map(|name| match resolver.resolve(&ModuleReference::new(name)) {
            Ok(resolved) => Some(resolved),
            Err(err) => {
                debug!(module = name, error = %err, "core library candidate unavailable");
                None
            }
        })
        .find_map(|resolved| {
            resolved
                .find_type("System", "Array")
                .cloned()
                .map(|ty| (resolved.name.clone(), ty))
        })
        .ok_or(HelperError::ArrayTypeNotFound)?;

    let empty = array_type
        .methods
        .iter()
        .find(|m| m.name == "Empty" && m.is_generic() && m.params.is_empty())
        .ok_or(HelperError::EmptyMethodNotFound)?;

    Ok(MethodRef {
        scope: Some(scope),
        declaring_type: array_type.self_type(),
        name: empty.name.clone(),
        has_this: false,
        params: Vec::new(),
        return_type: empty.return_type.clone(),
        generic_args: vec![TypeSig::Object],
    })
}

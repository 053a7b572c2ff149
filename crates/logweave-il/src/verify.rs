//! Method body verification
//!
//! Three layers of checking:
//! - [`compute_max_stack`] walks every reachable path (fall-through, branch
//!   edges, handler entries) and returns the peak operand-stack depth.
//! - [`simulate`] runs a typed abstract interpretation over a straight-line
//!   sequence, catching e.g. an unboxed value stored into an object array.
//! - [`verify_body`] / [`verify_module`] check structure: operands, targets,
//!   handler boundaries, local and argument indices, termination and depth.

use crate::body::{HandlerKind, InstrId, MethodBody};
use crate::instruction::{Instruction, Operand};
use crate::module::{MethodDef, Module, TypeDef};
use crate::opcode::Opcode;
use crate::types::TypeSig;
use rustc_hash::FxHashMap;
use std::fmt;

/// Verification errors
///
/// Positions are program-order indices into the body (or the simulated
/// sequence).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Operand does not match the opcode
    #[error("Malformed operand for {opcode} at position {position}")]
    MalformedOperand { opcode: Opcode, position: usize },

    /// Stack underflow
    #[error("Stack underflow at position {0}")]
    StackUnderflow(usize),

    /// Declared max stack is below what the body needs
    #[error("Declared max stack {declared} is below the required depth {required}")]
    StackOverflow { declared: u16, required: u16 },

    /// Two paths reach an instruction with different depths
    #[error("Inconsistent stack depth at position {position}: {expected} vs {found}")]
    InconsistentStackDepth {
        position: usize,
        expected: usize,
        found: usize,
    },

    /// Operand stack holds the wrong kind of value
    #[error("Type mismatch at position {position}: expected {expected}, found {found}")]
    TypeMismatch {
        position: usize,
        expected: StackKind,
        found: StackKind,
    },

    /// Branch target is not an instruction of the body
    #[error("Invalid branch target {target} at position {position}")]
    InvalidTarget { target: InstrId, position: usize },

    /// Exception handler boundary is not an instruction of the body
    #[error("Exception handler {0} refers to an instruction outside the body")]
    InvalidHandler(usize),

    /// Local slot out of range
    #[error("Invalid local variable reference: index {index} (max {max}) at position {position}")]
    InvalidLocalRef {
        index: usize,
        max: usize,
        position: usize,
    },

    /// Argument slot out of range
    #[error("Invalid argument reference: index {index} (max {max}) at position {position}")]
    InvalidArgRef {
        index: usize,
        max: usize,
        position: usize,
    },

    /// Execution falls off end
    #[error("Execution falls off end of method at position {0}")]
    FallOffEnd(usize),

    /// Error inside a named method
    #[error("{method}: {source}")]
    InMethod {
        method: String,
        source: Box<VerifyError>,
    },
}

/// Kind of value occupying an operand stack slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackKind {
    /// 32-bit integer (also booleans, chars, small integers)
    Int32,
    /// 64-bit integer
    Int64,
    /// Native-size integer
    NativeInt,
    /// Floating point
    Float,
    /// Object reference (including null, strings, arrays)
    ObjRef,
    /// Managed pointer (`T&`)
    ManagedPtr,
    /// Unboxed value type instance
    Value,
}

impl StackKind {
    /// Stack kind of a value of the given type
    pub fn of(ty: &TypeSig) -> StackKind {
        match ty {
            TypeSig::Boolean
            | TypeSig::Char
            | TypeSig::I1
            | TypeSig::U1
            | TypeSig::I2
            | TypeSig::U2
            | TypeSig::I4
            | TypeSig::U4 => StackKind::Int32,
            TypeSig::I8 | TypeSig::U8 => StackKind::Int64,
            TypeSig::IntPtr | TypeSig::UIntPtr => StackKind::NativeInt,
            TypeSig::R4 | TypeSig::R8 => StackKind::Float,
            TypeSig::ByRef(_) => StackKind::ManagedPtr,
            ty if ty.is_value_type() || ty.is_generic_parameter() => StackKind::Value,
            _ => StackKind::ObjRef,
        }
    }

    /// Whether a value of kind `found` may flow into a slot of this kind
    fn accepts(self, found: StackKind) -> bool {
        match self {
            StackKind::Int32 | StackKind::NativeInt => {
                matches!(found, StackKind::Int32 | StackKind::NativeInt)
            }
            // Generic parameters may be instantiated with anything
            StackKind::Value => found != StackKind::ManagedPtr,
            _ => self == found,
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StackKind::Int32 => "int32",
            StackKind::Int64 => "int64",
            StackKind::NativeInt => "native int",
            StackKind::Float => "float",
            StackKind::ObjRef => "object reference",
            StackKind::ManagedPtr => "managed pointer",
            StackKind::Value => "value",
        };
        f.write_str(name)
    }
}

/// Stack effect of an instruction as `(pops, pushes)`
///
/// Calls derive their effect from the method operand; `ret` pops the return
/// value when the method has one.
pub fn stack_effect(
    instr: &Instruction,
    returns_value: bool,
    position: usize,
) -> Result<(usize, usize), VerifyError> {
    let method = || match &instr.operand {
        Operand::Method(method) => Ok(method),
        _ => Err(VerifyError::MalformedOperand {
            opcode: instr.op,
            position,
        }),
    };

    let effect = match instr.op {
        Opcode::Nop | Opcode::Br | Opcode::Leave | Opcode::Endfinally | Opcode::Rethrow => (0, 0),
        Opcode::Dup => (1, 2),
        Opcode::Pop | Opcode::Starg | Opcode::Stloc | Opcode::Stsfld => (1, 0),
        Opcode::Ldarg
        | Opcode::Ldarga
        | Opcode::Ldloc
        | Opcode::Ldloca
        | Opcode::Ldnull
        | Opcode::LdcI4
        | Opcode::LdcI8
        | Opcode::LdcR8
        | Opcode::Ldstr
        | Opcode::Ldsfld => (0, 1),
        Opcode::Call | Opcode::Callvirt => {
            let method = method()?;
            (method.stack_inputs(), usize::from(method.returns_value()))
        }
        Opcode::Newobj => (method()?.params.len(), 1),
        Opcode::Ret => (usize::from(returns_value), 0),
        Opcode::Brfalse | Opcode::Brtrue | Opcode::Switch | Opcode::Throw => (1, 0),
        Opcode::Beq
        | Opcode::BneUn
        | Opcode::Blt
        | Opcode::Bgt
        | Opcode::Ble
        | Opcode::Bge
        | Opcode::Stfld => (2, 0),
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Rem
        | Opcode::Ceq
        | Opcode::Cgt
        | Opcode::Clt
        | Opcode::LdelemRef => (2, 1),
        Opcode::Neg
        | Opcode::Ldfld
        | Opcode::Newarr
        | Opcode::Ldlen
        | Opcode::Box
        | Opcode::UnboxAny
        | Opcode::Castclass
        | Opcode::Isinst
        | Opcode::Ldobj => (1, 1),
        Opcode::StelemRef => (3, 0),
    };
    Ok(effect)
}

/// Compute the peak operand-stack depth of a body
///
/// Walks fall-through and branch edges from the entry and from every handler
/// entry. Catch and filter blocks start with the exception object on the
/// stack; `leave` and `endfinally` empty it.
pub fn compute_max_stack(body: &MethodBody, returns_value: bool) -> Result<u16, VerifyError> {
    let list = &body.instructions;
    let positions = list.positions();
    let position_of = |id: InstrId| positions.get(&id).copied().unwrap_or(usize::MAX);

    let mut depths: FxHashMap<InstrId, usize> = FxHashMap::default();
    let mut worklist: Vec<(InstrId, usize)> = Vec::new();
    worklist.extend(list.first().map(|entry| (entry, 0)));
    for handler in &body.handlers {
        let entry_depth = match handler.kind {
            HandlerKind::Catch(_) | HandlerKind::Filter { .. } => 1,
            HandlerKind::Finally | HandlerKind::Fault => 0,
        };
        worklist.push((handler.handler_start, entry_depth));
        if let HandlerKind::Filter { filter_start } = handler.kind {
            worklist.push((filter_start, 1));
        }
    }

    let mut max = 0usize;
    while let Some((id, depth)) = worklist.pop() {
        match depths.get(&id) {
            Some(&seen) if seen == depth => continue,
            Some(&seen) => {
                return Err(VerifyError::InconsistentStackDepth {
                    position: position_of(id),
                    expected: seen,
                    found: depth,
                })
            }
            None => {}
        }
        depths.insert(id, depth);

        let position = position_of(id);
        let instr = list.get(id).ok_or(VerifyError::InvalidTarget {
            target: id,
            position,
        })?;
        let (pops, pushes) = stack_effect(instr, returns_value, position)?;
        if depth < pops {
            return Err(VerifyError::StackUnderflow(position));
        }
        let after = depth - pops + pushes;
        max = max.max(depth).max(after);

        match instr.op {
            Opcode::Leave => worklist.extend(instr.operand.targets().into_iter().map(|t| (t, 0))),
            Opcode::Endfinally | Opcode::Ret | Opcode::Throw | Opcode::Rethrow => {}
            op => {
                worklist.extend(instr.operand.targets().into_iter().map(|t| (t, after)));
                if !op.is_terminator() {
                    worklist.extend(list.next(id).map(|next| (next, after)));
                }
            }
        }
    }

    Ok(u16::try_from(max).unwrap_or(u16::MAX))
}

fn pop(stack: &mut Vec<StackKind>, position: usize) -> Result<StackKind, VerifyError> {
    stack.pop().ok_or(VerifyError::StackUnderflow(position))
}

fn pop_expecting(
    stack: &mut Vec<StackKind>,
    expected: StackKind,
    position: usize,
) -> Result<StackKind, VerifyError> {
    let found = pop(stack, position)?;
    if expected.accepts(found) {
        Ok(found)
    } else {
        Err(VerifyError::TypeMismatch {
            position,
            expected,
            found,
        })
    }
}

fn slot<'a>(
    slots: &'a [TypeSig],
    index: u16,
    position: usize,
    local: bool,
) -> Result<&'a TypeSig, VerifyError> {
    slots.get(usize::from(index)).ok_or_else(|| {
        let (index, max) = (usize::from(index), slots.len());
        if local {
            VerifyError::InvalidLocalRef {
                index,
                max,
                position,
            }
        } else {
            VerifyError::InvalidArgRef {
                index,
                max,
                position,
            }
        }
    })
}

/// Typed abstract interpretation of a straight-line instruction sequence
///
/// `args` are the argument slot types (`this` first on instance methods) and
/// `locals` the local slot types. Control flow is not followed: branches only
/// apply their stack effect. Returns the stack left after the last
/// instruction, bottom first.
pub fn simulate(
    instrs: &[Instruction],
    args: &[TypeSig],
    locals: &[TypeSig],
) -> Result<Vec<StackKind>, VerifyError> {
    let mut stack: Vec<StackKind> = Vec::new();

    for (position, instr) in instrs.iter().enumerate() {
        if !instr.is_well_formed() {
            return Err(VerifyError::MalformedOperand {
                opcode: instr.op,
                position,
            });
        }

        match (instr.op, &instr.operand) {
            (Opcode::Ldarg, Operand::Arg(index)) => {
                stack.push(StackKind::of(slot(args, *index, position, false)?))
            }
            (Opcode::Ldarga, Operand::Arg(index)) => {
                slot(args, *index, position, false)?;
                stack.push(StackKind::ManagedPtr);
            }
            (Opcode::Starg, Operand::Arg(index)) => {
                let expected = StackKind::of(slot(args, *index, position, false)?);
                pop_expecting(&mut stack, expected, position)?;
            }
            (Opcode::Ldloc, Operand::Local(index)) => {
                stack.push(StackKind::of(slot(locals, *index, position, true)?))
            }
            (Opcode::Ldloca, Operand::Local(index)) => {
                slot(locals, *index, position, true)?;
                stack.push(StackKind::ManagedPtr);
            }
            (Opcode::Stloc, Operand::Local(index)) => {
                let expected = StackKind::of(slot(locals, *index, position, true)?);
                pop_expecting(&mut stack, expected, position)?;
            }
            (Opcode::Ldnull | Opcode::Ldstr, _) => stack.push(StackKind::ObjRef),
            (Opcode::LdcI4, _) => stack.push(StackKind::Int32),
            (Opcode::LdcI8, _) => stack.push(StackKind::Int64),
            (Opcode::LdcR8, _) => stack.push(StackKind::Float),
            (Opcode::Dup, _) => {
                let top = pop(&mut stack, position)?;
                stack.extend([top, top]);
            }
            (Opcode::Call | Opcode::Callvirt | Opcode::Newobj, Operand::Method(method)) => {
                for param in method.params.iter().rev() {
                    pop_expecting(&mut stack, StackKind::of(param), position)?;
                }
                if instr.op == Opcode::Newobj {
                    stack.push(if method.declaring_type.is_value_type() {
                        StackKind::Value
                    } else {
                        StackKind::ObjRef
                    });
                } else {
                    if method.has_this {
                        let receiver = pop(&mut stack, position)?;
                        if !matches!(receiver, StackKind::ObjRef | StackKind::ManagedPtr) {
                            return Err(VerifyError::TypeMismatch {
                                position,
                                expected: StackKind::ObjRef,
                                found: receiver,
                            });
                        }
                    }
                    if method.returns_value() {
                        stack.push(StackKind::of(&method.return_type));
                    }
                }
            }
            (Opcode::Ldfld, Operand::Field(field)) => {
                pop(&mut stack, position)?;
                stack.push(StackKind::of(&field.field_type));
            }
            (Opcode::Stfld, Operand::Field(field)) => {
                pop_expecting(&mut stack, StackKind::of(&field.field_type), position)?;
                pop(&mut stack, position)?;
            }
            (Opcode::Ldsfld, Operand::Field(field)) => stack.push(StackKind::of(&field.field_type)),
            (Opcode::Stsfld, Operand::Field(field)) => {
                pop_expecting(&mut stack, StackKind::of(&field.field_type), position)?;
            }
            (Opcode::Newarr, _) => {
                pop_expecting(&mut stack, StackKind::Int32, position)?;
                stack.push(StackKind::ObjRef);
            }
            (Opcode::Ldlen, _) => {
                pop_expecting(&mut stack, StackKind::ObjRef, position)?;
                stack.push(StackKind::NativeInt);
            }
            (Opcode::LdelemRef, _) => {
                pop_expecting(&mut stack, StackKind::Int32, position)?;
                pop_expecting(&mut stack, StackKind::ObjRef, position)?;
                stack.push(StackKind::ObjRef);
            }
            (Opcode::StelemRef, _) => {
                pop_expecting(&mut stack, StackKind::ObjRef, position)?;
                pop_expecting(&mut stack, StackKind::Int32, position)?;
                pop_expecting(&mut stack, StackKind::ObjRef, position)?;
            }
            (Opcode::Box, _) => {
                let found = pop(&mut stack, position)?;
                if found == StackKind::ManagedPtr {
                    return Err(VerifyError::TypeMismatch {
                        position,
                        expected: StackKind::Value,
                        found,
                    });
                }
                stack.push(StackKind::ObjRef);
            }
            (Opcode::UnboxAny, Operand::Type(ty)) => {
                pop_expecting(&mut stack, StackKind::ObjRef, position)?;
                stack.push(StackKind::of(ty));
            }
            (Opcode::Castclass | Opcode::Isinst, _) => {
                pop_expecting(&mut stack, StackKind::ObjRef, position)?;
                stack.push(StackKind::ObjRef);
            }
            (Opcode::Ldobj, Operand::Type(ty)) => {
                pop_expecting(&mut stack, StackKind::ManagedPtr, position)?;
                stack.push(StackKind::of(ty));
            }
            (Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Rem, _) => {
                let right = pop(&mut stack, position)?;
                let left = pop_expecting(&mut stack, right, position)?;
                stack.push(left);
            }
            (Opcode::Neg, _) => {
                let value = pop(&mut stack, position)?;
                stack.push(value);
            }
            (Opcode::Ceq | Opcode::Cgt | Opcode::Clt, _) => {
                pop(&mut stack, position)?;
                pop(&mut stack, position)?;
                stack.push(StackKind::Int32);
            }
            (Opcode::Ret | Opcode::Leave | Opcode::Endfinally, _) => stack.clear(),
            _ => {
                // Control flow: apply the effect only
                let (pops, _) = stack_effect(instr, false, position)?;
                for _ in 0..pops {
                    pop(&mut stack, position)?;
                }
            }
        }
    }

    Ok(stack)
}

/// Check the structure of a body
///
/// The body must be non-empty, every operand must match its opcode, every
/// branch target and handler boundary must be an instruction of the body,
/// local indices must be within the slot pool, the last instruction must not
/// fall through, and the declared `max_stack` must cover the computed depth.
pub fn verify_body(body: &MethodBody, returns_value: bool) -> Result<(), VerifyError> {
    let list = &body.instructions;
    let Some(last) = list.last() else {
        return Err(VerifyError::FallOffEnd(0));
    };

    for (position, (_, instr)) in list.iter().enumerate() {
        if !instr.is_well_formed() {
            return Err(VerifyError::MalformedOperand {
                opcode: instr.op,
                position,
            });
        }
        if let Some(target) = instr
            .operand
            .targets()
            .into_iter()
            .find(|t| !list.contains(*t))
        {
            return Err(VerifyError::InvalidTarget { target, position });
        }
        if let Operand::Local(index) = instr.operand {
            slot(&body.locals, index, position, true)?;
        }
    }

    for (index, handler) in body.handlers.iter().enumerate() {
        if !handler.boundaries().into_iter().all(|id| list.contains(id)) {
            return Err(VerifyError::InvalidHandler(index));
        }
    }

    if list.get(last).is_some_and(|instr| !instr.op.is_terminator()) {
        return Err(VerifyError::FallOffEnd(list.len() - 1));
    }

    let required = compute_max_stack(body, returns_value)?;
    if required > body.max_stack {
        return Err(VerifyError::StackOverflow {
            declared: body.max_stack,
            required,
        });
    }

    Ok(())
}

/// Verify one method: its body plus argument indices against its signature
pub fn verify_method(method: &MethodDef, declaring: &TypeDef) -> Result<(), VerifyError> {
    let Some(body) = &method.body else {
        return Ok(());
    };
    let args = method.argument_types(declaring);

    let result = verify_body(body, method.returns_value()).and_then(|()| {
        for (position, (_, instr)) in body.instructions.iter().enumerate() {
            if let Operand::Arg(index) = instr.operand {
                slot(&args, index, position, false)?;
            }
        }
        Ok(())
    });

    result.map_err(|source| VerifyError::InMethod {
        method: method.full_name(declaring),
        source: Box::new(source),
    })
}

/// Verify every method body in a module
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    for ty in &module.types {
        for method in &ty.methods {
            verify_method(method, ty)?;
        }
    }
    Ok(())
}

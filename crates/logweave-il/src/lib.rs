//! logweave bytecode model
//!
//! This crate provides the in-memory representation of a compiled module
//! (types, fields, methods, bodies), the stack-machine instruction set, an
//! identity-stable instruction list for in-place rewriting, and the stack
//! verifier used to keep rewritten bodies valid.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod body;
pub mod disasm;
pub mod encoder;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod types;
pub mod verify;

pub use body::{BodyError, ExceptionHandler, HandlerKind, InstrId, InstructionList, MethodBody};
pub use disasm::Listing;
pub use instruction::{FieldRef, Instruction, MethodRef, Operand};
pub use module::{
    FieldDef, MethodDef, Module, ModuleError, ModuleReference, ParamDef, TypeDef, Visibility,
};
pub use opcode::Opcode;
pub use types::{TypeKind, TypeName, TypeSig};
pub use verify::{
    compute_max_stack, simulate, stack_effect, verify_body, verify_method, verify_module,
    StackKind, VerifyError,
};

//! Stack-machine opcodes
//!
//! The instruction set is the subset of a CIL-style stack machine that
//! compiled method bodies contain and the weaver emits. Operands are carried
//! structurally by [`crate::Operand`]; short and long encodings of the same
//! operation (e.g. `ldarg.0` / `ldarg.s` / `ldarg`) are a single opcode here.
//!
//! Opcodes are organized into categories:
//! - Arguments and locals
//! - Constants
//! - Stack manipulation
//! - Calls and returns
//! - Branches and exception flow
//! - Arithmetic and comparison
//! - Fields
//! - Arrays
//! - Object model (boxing, casts)

use serde::{Deserialize, Serialize};

/// The shape of operand an opcode expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandShape {
    /// No operand
    None,
    /// 32-bit integer constant
    Int32,
    /// 64-bit integer constant
    Int64,
    /// 64-bit float constant
    Float64,
    /// String literal
    String,
    /// Argument index
    Arg,
    /// Local slot index
    Local,
    /// Type token
    Type,
    /// Field token
    Field,
    /// Method token
    Method,
    /// Single branch target
    Target,
    /// Jump table
    Switch,
}

/// Bytecode opcode enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    // ===== Stack Manipulation =====
    /// No operation
    Nop,
    /// Duplicate top stack value
    Dup,
    /// Pop top value from stack
    Pop,

    // ===== Arguments & Locals =====
    /// Load argument onto stack (operand: argument index, `this` is 0)
    Ldarg,
    /// Load argument address
    Ldarga,
    /// Store top of stack to argument
    Starg,
    /// Load local variable onto stack (operand: slot index)
    Ldloc,
    /// Load local variable address
    Ldloca,
    /// Store top of stack to local variable
    Stloc,

    // ===== Constants =====
    /// Push null reference
    Ldnull,
    /// Push 32-bit integer constant
    LdcI4,
    /// Push 64-bit integer constant
    LdcI8,
    /// Push 64-bit float constant
    LdcR8,
    /// Push string literal
    Ldstr,

    // ===== Calls =====
    /// Call method (operand: method token)
    Call,
    /// Call method through virtual dispatch
    Callvirt,
    /// Allocate object and call constructor
    Newobj,
    /// Return from method
    Ret,

    // ===== Control Flow =====
    /// Unconditional branch
    Br,
    /// Branch if value is zero/null/false
    Brfalse,
    /// Branch if value is non-zero/non-null/true
    Brtrue,
    /// Branch if equal
    Beq,
    /// Branch if not equal (unordered)
    BneUn,
    /// Branch if less than
    Blt,
    /// Branch if greater than
    Bgt,
    /// Branch if less than or equal
    Ble,
    /// Branch if greater than or equal
    Bge,
    /// Jump table
    Switch,
    /// Exit a protected region, emptying the stack
    Leave,
    /// End of a finally or fault handler
    Endfinally,
    /// Throw the exception object on the stack
    Throw,
    /// Rethrow the current exception from a catch handler
    Rethrow,

    // ===== Arithmetic & Comparison =====
    /// Addition: pop b, pop a, push a + b
    Add,
    /// Subtraction: pop b, pop a, push a - b
    Sub,
    /// Multiplication: pop b, pop a, push a * b
    Mul,
    /// Division: pop b, pop a, push a / b
    Div,
    /// Remainder: pop b, pop a, push a % b
    Rem,
    /// Negation: pop a, push -a
    Neg,
    /// Equality: pop b, pop a, push a == b
    Ceq,
    /// Greater than: pop b, pop a, push a > b
    Cgt,
    /// Less than: pop b, pop a, push a < b
    Clt,

    // ===== Fields =====
    /// Load instance field (operand: field token)
    Ldfld,
    /// Store instance field
    Stfld,
    /// Load static field
    Ldsfld,
    /// Store static field
    Stsfld,

    // ===== Arrays =====
    /// Allocate array (operand: element type)
    Newarr,
    /// Push array length
    Ldlen,
    /// Load object-reference array element
    LdelemRef,
    /// Store object-reference array element
    StelemRef,

    // ===== Object Model =====
    /// Box a value type (operand: value type)
    Box,
    /// Unbox to a value (operand: type)
    UnboxAny,
    /// Checked reference cast (operand: type)
    Castclass,
    /// Type test, pushing the reference or null
    Isinst,
    /// Load a value through a managed pointer (operand: type)
    Ldobj,
}

impl Opcode {
    /// Get the mnemonic for this opcode
    pub fn name(self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Dup => "dup",
            Self::Pop => "pop",
            Self::Ldarg => "ldarg",
            Self::Ldarga => "ldarga",
            Self::Starg => "starg",
            Self::Ldloc => "ldloc",
            Self::Ldloca => "ldloca",
            Self::Stloc => "stloc",
            Self::Ldnull => "ldnull",
            Self::LdcI4 => "ldc.i4",
            Self::LdcI8 => "ldc.i8",
            Self::LdcR8 => "ldc.r8",
            Self::Ldstr => "ldstr",
            Self::Call => "call",
            Self::Callvirt => "callvirt",
            Self::Newobj => "newobj",
            Self::Ret => "ret",
            Self::Br => "br",
            Self::Brfalse => "brfalse",
            Self::Brtrue => "brtrue",
            Self::Beq => "beq",
            Self::BneUn => "bne.un",
            Self::Blt => "blt",
            Self::Bgt => "bgt",
            Self::Ble => "ble",
            Self::Bge => "bge",
            Self::Switch => "switch",
            Self::Leave => "leave",
            Self::Endfinally => "endfinally",
            Self::Throw => "throw",
            Self::Rethrow => "rethrow",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::Neg => "neg",
            Self::Ceq => "ceq",
            Self::Cgt => "cgt",
            Self::Clt => "clt",
            Self::Ldfld => "ldfld",
            Self::Stfld => "stfld",
            Self::Ldsfld => "ldsfld",
            Self::Stsfld => "stsfld",
            Self::Newarr => "newarr",
            Self::Ldlen => "ldlen",
            Self::LdelemRef => "ldelem.ref",
            Self::StelemRef => "stelem.ref",
            Self::Box => "box",
            Self::UnboxAny => "unbox.any",
            Self::Castclass => "castclass",
            Self::Isinst => "isinst",
            Self::Ldobj => "ldobj",
        }
    }

    /// The operand shape this opcode requires
    pub fn operand_shape(self) -> OperandShape {
        match self {
            Self::Ldarg | Self::Ldarga | Self::Starg => OperandShape::Arg,
            Self::Ldloc | Self::Ldloca | Self::Stloc => OperandShape::Local,
            Self::LdcI4 => OperandShape::Int32,
            Self::LdcI8 => OperandShape::Int64,
            Self::LdcR8 => OperandShape::Float64,
            Self::Ldstr => OperandShape::String,
            Self::Call | Self::Callvirt | Self::Newobj => OperandShape::Method,
            Self::Br
            | Self::Brfalse
            | Self::Brtrue
            | Self::Beq
            | Self::BneUn
            | Self::Blt
            | Self::Bgt
            | Self::Ble
            | Self::Bge
            | Self::Leave => OperandShape::Target,
            Self::Switch => OperandShape::Switch,
            Self::Ldfld | Self::Stfld | Self::Ldsfld | Self::Stsfld => OperandShape::Field,
            Self::Newarr
            | Self::Box
            | Self::UnboxAny
            | Self::Castclass
            | Self::Isinst
            | Self::Ldobj => OperandShape::Type,
            _ => OperandShape::None,
        }
    }

    /// Check if this opcode is a branch instruction (including `switch` and `leave`)
    pub fn is_branch(self) -> bool {
        matches!(
            self.operand_shape(),
            OperandShape::Target | OperandShape::Switch
        )
    }

    /// Check if this opcode is a conditional branch
    pub fn is_conditional_branch(self) -> bool {
        self.is_branch() && !matches!(self, Self::Br | Self::Leave)
    }

    /// Check if this opcode is a call instruction
    pub fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::Callvirt | Self::Newobj)
    }

    /// Check if this opcode is a return instruction
    pub fn is_return(self) -> bool {
        matches!(self, Self::Ret)
    }

    /// Check if control never falls through to the next instruction
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Self::Br | Self::Leave | Self::Ret | Self::Throw | Self::Rethrow | Self::Endfinally
        )
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

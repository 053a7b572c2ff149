//! Instructions, operands and member references

use crate::body::InstrId;
use crate::opcode::{Opcode, OperandShape};
use crate::types::TypeSig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a field, as carried by `ldfld`/`stfld`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    /// Type declaring the field (instantiated if generic)
    pub declaring_type: TypeSig,
    /// Field name
    pub name: String,
    /// Declared field type
    pub field_type: TypeSig,
}

impl FieldRef {
    /// Full name: `FieldType DeclaringType::name`
    pub fn full_name(&self) -> String {
        format!(
            "{} {}::{}",
            self.field_type.full_name(),
            self.declaring_type.full_name(),
            self.name
        )
    }
}

/// Reference to a method, as carried by `call`/`callvirt`/`newobj`
///
/// References to methods defined in another module carry that module's name
/// as `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    /// Module defining the method (`None` for the module being rewritten)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Type declaring the method
    pub declaring_type: TypeSig,
    /// Method name
    pub name: String,
    /// Whether the method takes an implicit receiver
    #[serde(default)]
    pub has_this: bool,
    /// Formal parameter types
    #[serde(default)]
    pub params: Vec<TypeSig>,
    /// Return type
    pub return_type: TypeSig,
    /// Generic arguments, for a specialized generic method
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub generic_args: Vec<TypeSig>,
}

impl MethodRef {
    /// Whether the call leaves a value on the stack
    pub fn returns_value(&self) -> bool {
        self.return_type != TypeSig::Void
    }

    /// Number of stack values the call consumes (receiver included)
    pub fn stack_inputs(&self) -> usize {
        self.params.len() + usize::from(self.has_this)
    }

    /// Full name: `ReturnType DeclaringType::Name<Args>(ParamTypes)`
    pub fn full_name(&self) -> String {
        let params: Vec<String> = self.params.iter().map(TypeSig::full_name).collect();
        let generic = if self.generic_args.is_empty() {
            String::new()
        } else {
            let args: Vec<String> = self.generic_args.iter().map(TypeSig::full_name).collect();
            format!("<{}>", args.join(","))
        };
        format!(
            "{} {}::{}{}({})",
            self.return_type.full_name(),
            self.declaring_type.full_name(),
            self.name,
            generic,
            params.join(",")
        )
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    /// No operand
    #[default]
    None,
    /// 32-bit integer constant
    Int32(i32),
    /// 64-bit integer constant
    Int64(i64),
    /// 64-bit float constant
    Float64(f64),
    /// String literal
    String(String),
    /// Argument index (`this` is 0 on instance methods)
    Arg(u16),
    /// Local slot index
    Local(u16),
    /// Type token
    Type(TypeSig),
    /// Field token
    Field(FieldRef),
    /// Method token
    Method(MethodRef),
    /// Branch target
    Target(InstrId),
    /// Jump table targets
    Switch(Vec<InstrId>),
}

impl Operand {
    /// Whether this is [`Operand::None`]
    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    /// The shape of this operand
    pub fn shape(&self) -> OperandShape {
        match self {
            Operand::None => OperandShape::None,
            Operand::Int32(_) => OperandShape::Int32,
            Operand::Int64(_) => OperandShape::Int64,
            Operand::Float64(_) => OperandShape::Float64,
            Operand::String(_) => OperandShape::String,
            Operand::Arg(_) => OperandShape::Arg,
            Operand::Local(_) => OperandShape::Local,
            Operand::Type(_) => OperandShape::Type,
            Operand::Field(_) => OperandShape::Field,
            Operand::Method(_) => OperandShape::Method,
            Operand::Target(_) => OperandShape::Target,
            Operand::Switch(_) => OperandShape::Switch,
        }
    }

    /// Branch targets referenced by this operand
    pub fn targets(&self) -> Vec<InstrId> {
        match self {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }
}

/// A single instruction: an opcode and its operand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Opcode
    pub op: Opcode,
    /// Operand (must match `op.operand_shape()`)
    #[serde(default, skip_serializing_if = "Operand::is_none")]
    pub operand: Operand,
}

impl Instruction {
    /// Create an instruction from parts
    pub fn new(op: Opcode, operand: Operand) -> Self {
        Self { op, operand }
    }

    /// Instruction without operand
    pub fn simple(op: Opcode) -> Self {
        Self::new(op, Operand::None)
    }

    /// `ldarg <index>`
    pub fn ldarg(index: u16) -> Self {
        Self::new(Opcode::Ldarg, Operand::Arg(index))
    }

    /// `ldloc <slot>`
    pub fn ldloc(slot: u16) -> Self {
        Self::new(Opcode::Ldloc, Operand::Local(slot))
    }

    /// `stloc <slot>`
    pub fn stloc(slot: u16) -> Self {
        Self::new(Opcode::Stloc, Operand::Local(slot))
    }

    /// `ldc.i4 <value>`
    pub fn ldc_i4(value: i32) -> Self {
        Self::new(Opcode::LdcI4, Operand::Int32(value))
    }

    /// `ldstr "<value>"`
    pub fn ldstr(value: impl Into<String>) -> Self {
        Self::new(Opcode::Ldstr, Operand::String(value.into()))
    }

    /// `ldfld <field>`
    pub fn ldfld(field: FieldRef) -> Self {
        Self::new(Opcode::Ldfld, Operand::Field(field))
    }

    /// Instruction with a type operand (`newarr`, `box`, `castclass`, ...)
    pub fn with_type(op: Opcode, ty: TypeSig) -> Self {
        Self::new(op, Operand::Type(ty))
    }

    /// `call <method>`
    pub fn call(method: MethodRef) -> Self {
        Self::new(Opcode::Call, Operand::Method(method))
    }

    /// Branch to `target`
    pub fn branch(op: Opcode, target: InstrId) -> Self {
        Self::new(op, Operand::Target(target))
    }

    /// `ret`
    pub fn ret() -> Self {
        Self::simple(Opcode::Ret)
    }

    /// Whether the operand matches the shape the opcode requires
    pub fn is_well_formed(&self) -> bool {
        self.op.operand_shape() == self.operand.shape()
    }
}

impl fmt::Display for Instruction {
    /// Operand-bearing forms use the short encodings where one exists
    /// (`ldarg.0`, `ldloc.2`). Branch targets print as raw ids; the
    /// disassembler prints them as labels instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.op, &self.operand) {
            (Opcode::Ldarg | Opcode::Ldloc | Opcode::Stloc, Operand::Arg(i) | Operand::Local(i))
                if *i <= 3 =>
            {
                write!(f, "{}.{}", self.op, i)
            }
            (_, Operand::None) => write!(f, "{}", self.op),
            (_, Operand::Int32(v)) => write!(f, "{} {}", self.op, v),
            (_, Operand::Int64(v)) => write!(f, "{} {}", self.op, v),
            (_, Operand::Float64(v)) => write!(f, "{} {}", self.op, v),
            (_, Operand::String(s)) => write!(f, "{} {:?}", self.op, s),
            (_, Operand::Arg(i)) | (_, Operand::Local(i)) => write!(f, "{} {}", self.op, i),
            (_, Operand::Type(ty)) => write!(f, "{} {}", self.op, ty),
            (_, Operand::Field(field)) => write!(f, "{} {}", self.op, field.full_name()),
            (_, Operand::Method(method)) => write!(f, "{} {}", self.op, method.full_name()),
            (_, Operand::Target(target)) => write!(f, "{} {}", self.op, target),
            (_, Operand::Switch(targets)) => {
                let targets: Vec<String> = targets.iter().map(InstrId::to_string).collect();
                write!(f, "{} ({})", self.op, targets.join(", "))
            }
        }
    }
}

//! Method bodies and the identity-stable instruction list
//!
//! Branch operands and exception-handler boundaries refer to instructions by
//! [`InstrId`]. The list is an arena of nodes linked in program order, so
//! inserting new instructions never moves or renumbers existing ones and
//! every reference keeps pointing at the same logical instruction.

use crate::encoder::BodyRepr;
use crate::instruction::Instruction;
use crate::types::TypeSig;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// Identity 0 is reserved for positional handles read from disk
static NEXT_LIST: AtomicU32 = AtomicU32::new(1);

/// Stable handle to an instruction inside one [`InstructionList`]
///
/// A handle carries the identity of the list that issued it, so a handle
/// from another body is never mistaken for one of this body's instructions.
/// Cloned lists share their source's identity. On disk a handle is just the
/// instruction's program-order position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId {
    list: u32,
    index: u32,
}

impl InstrId {
    /// Handle by program-order position, not yet bound to a list
    pub(crate) fn positional(index: u32) -> Self {
        Self { list: 0, index }
    }

    /// Raw arena index
    pub fn as_u32(self) -> u32 {
        self.index
    }

    pub(crate) fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

impl Serialize for InstrId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.index)
    }
}

impl<'de> Deserialize<'de> for InstrId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u32::deserialize(deserializer).map(InstrId::positional)
    }
}

/// Instruction list errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BodyError {
    /// The anchor is not part of this list
    #[error("Instruction {0} does not belong to this body")]
    UnknownInstruction(InstrId),

    /// A branch or handler refers to a position past the end of the body
    #[error("Reference to instruction position {position} in a body of {len} instructions")]
    DanglingReference { position: usize, len: usize },

    /// Too many instructions for the handle space
    #[error("Instruction list is full")]
    Full,

    /// Too many local slots for a 16-bit slot index
    #[error("Too many local variables (max 65536)")]
    TooManyLocals,
}

#[derive(Debug, Clone)]
struct Node {
    instr: Instruction,
    prev: Option<InstrId>,
    next: Option<InstrId>,
}

/// Ordered instruction sequence with stable identities
#[derive(Debug, Clone)]
pub struct InstructionList {
    id: u32,
    nodes: Vec<Node>,
    head: Option<InstrId>,
    tail: Option<InstrId>,
}

impl Default for InstructionList {
    fn default() -> Self {
        Self {
            id: NEXT_LIST.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            head: None,
            tail: None,
        }
    }
}

impl InstructionList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from instructions in program order
    pub fn try_from_instructions(
        instrs: impl IntoIterator<Item = Instruction>,
    ) -> Result<Self, BodyError> {
        let mut list = Self::new();
        for instr in instrs {
            list.push(instr)?;
        }
        Ok(list)
    }

    /// Number of instructions
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First instruction in program order
    pub fn first(&self) -> Option<InstrId> {
        self.head
    }

    /// Last instruction in program order
    pub fn last(&self) -> Option<InstrId> {
        self.tail
    }

    /// Whether `id` is an instruction of this list
    pub fn contains(&self, id: InstrId) -> bool {
        id.list == self.id && id.index() < self.nodes.len()
    }

    fn node(&self, id: InstrId) -> Option<&Node> {
        if id.list == self.id {
            self.nodes.get(id.index())
        } else {
            None
        }
    }

    /// Instruction by handle
    pub fn get(&self, id: InstrId) -> Option<&Instruction> {
        self.node(id).map(|node| &node.instr)
    }

    /// Mutable instruction by handle
    pub fn get_mut(&mut self, id: InstrId) -> Option<&mut Instruction> {
        if id.list != self.id {
            return None;
        }
        self.nodes.get_mut(id.index()).map(|node| &mut node.instr)
    }

    /// Instruction following `id` in program order
    pub fn next(&self, id: InstrId) -> Option<InstrId> {
        self.node(id).and_then(|node| node.next)
    }

    /// Instruction preceding `id` in program order
    pub fn prev(&self, id: InstrId) -> Option<InstrId> {
        self.node(id).and_then(|node| node.prev)
    }

    fn allocate(&mut self, instr: Instruction) -> Result<InstrId, BodyError> {
        let index = u32::try_from(self.nodes.len()).map_err(|_| BodyError::Full)?;
        self.nodes.push(Node {
            instr,
            prev: None,
            next: None,
        });
        Ok(InstrId {
            list: self.id,
            index,
        })
    }

    /// Append an instruction at the end
    pub fn push(&mut self, instr: Instruction) -> Result<InstrId, BodyError> {
        let id = self.allocate(instr)?;
        match self.tail {
            Some(tail) => {
                self.nodes[tail.index()].next = Some(id);
                self.nodes[id.index()].prev = Some(tail);
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        Ok(id)
    }

    /// Insert an instruction immediately before `anchor`
    pub fn insert_before(
        &mut self,
        anchor: InstrId,
        instr: Instruction,
    ) -> Result<InstrId, BodyError> {
        if !self.contains(anchor) {
            return Err(BodyError::UnknownInstruction(anchor));
        }

        let id = self.allocate(instr)?;
        let prev = self.nodes[anchor.index()].prev;
        {
            let node = &mut self.nodes[id.index()];
            node.prev = prev;
            node.next = Some(anchor);
        }
        self.nodes[anchor.index()].prev = Some(id);
        match prev {
            Some(prev) => self.nodes[prev.index()].next = Some(id),
            None => self.head = Some(id),
        }
        Ok(id)
    }

    /// Insert a block of instructions, in order, immediately before `anchor`
    ///
    /// The anchor is checked before anything is inserted, so a failed call
    /// leaves the list untouched.
    pub fn insert_all_before(
        &mut self,
        anchor: InstrId,
        instrs: impl IntoIterator<Item = Instruction>,
    ) -> Result<Vec<InstrId>, BodyError> {
        if !self.contains(anchor) {
            return Err(BodyError::UnknownInstruction(anchor));
        }
        instrs
            .into_iter()
            .map(|instr| self.insert_before(anchor, instr))
            .collect()
    }

    /// Iterate in program order
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    /// Handles in program order
    pub fn ids(&self) -> Vec<InstrId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Instructions in program order
    pub fn instructions(&self) -> Vec<&Instruction> {
        self.iter().map(|(_, instr)| instr).collect()
    }

    /// Map from handle to program-order position
    pub fn positions(&self) -> rustc_hash::FxHashMap<InstrId, usize> {
        self.iter()
            .enumerate()
            .map(|(position, (id, _))| (id, position))
            .collect()
    }
}

/// Program-order iterator over an [`InstructionList`]
pub struct Iter<'a> {
    list: &'a InstructionList,
    cursor: Option<InstrId>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (InstrId, &'a Instruction);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = &self.list.nodes[id.index()];
        self.cursor = node.next;
        Some((id, &node.instr))
    }
}

/// Exception handler kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Typed catch clause
    Catch(TypeSig),
    /// Filter clause; the filter block starts at `filter_start`
    Filter {
        /// First instruction of the filter block
        filter_start: InstrId,
    },
    /// Finally clause
    Finally,
    /// Fault clause
    Fault,
}

/// Exception-handling region
///
/// End boundaries are exclusive; `None` means the end of the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// Handler kind
    pub kind: HandlerKind,
    /// First protected instruction
    pub try_start: InstrId,
    /// First instruction after the protected block
    pub try_end: Option<InstrId>,
    /// First handler instruction
    pub handler_start: InstrId,
    /// First instruction after the handler block
    pub handler_end: Option<InstrId>,
}

impl ExceptionHandler {
    /// Every instruction this handler refers to
    pub fn boundaries(&self) -> Vec<InstrId> {
        let mut ids = vec![self.try_start, self.handler_start];
        ids.extend(self.try_end);
        ids.extend(self.handler_end);
        if let HandlerKind::Filter { filter_start } = self.kind {
            ids.push(filter_start);
        }
        ids
    }
}

/// A method body: instructions, local slots and exception handlers
///
/// On disk the body is stored in program order with positional branch
/// targets; see [`crate::encoder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "BodyRepr", into = "BodyRepr")]
pub struct MethodBody {
    /// Maximum operand stack depth
    pub max_stack: u16,
    /// Whether locals are zero-initialized
    pub init_locals: bool,
    /// Local slot types, indexed by slot
    pub locals: Vec<TypeSig>,
    /// Instructions
    pub instructions: InstructionList,
    /// Exception handlers
    pub handlers: Vec<ExceptionHandler>,
}

impl Default for MethodBody {
    fn default() -> Self {
        Self {
            max_stack: 8,
            init_locals: true,
            locals: Vec::new(),
            instructions: InstructionList::new(),
            handlers: Vec::new(),
        }
    }
}

impl MethodBody {
    /// Create an empty body
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a body from instructions in program order
    pub fn from_instructions(
        instrs: impl IntoIterator<Item = Instruction>,
    ) -> Result<Self, BodyError> {
        Ok(Self {
            instructions: InstructionList::try_from_instructions(instrs)?,
            ..Self::default()
        })
    }

    /// Append a local slot, returning its index
    pub fn add_local(&mut self, ty: TypeSig) -> Result<u16, BodyError> {
        let slot = u16::try_from(self.locals.len()).map_err(|_| BodyError::TooManyLocals)?;
        self.locals.push(ty);
        Ok(slot)
    }

    /// Handles of every return instruction, in program order
    pub fn return_sites(&self) -> Vec<InstrId> {
        self.instructions
            .iter()
            .filter(|(_, instr)| instr.op.is_return())
            .map(|(id, _)| id)
            .collect()
    }
}

//! Body encoding
//!
//! In memory, branch targets are arena handles that survive insertion. On
//! disk they are program-order positions: encoding renumbers every reference
//! by position, decoding rebuilds the list and binds each position to the
//! handle of the `n`th instruction, rejecting references past the end.

use crate::body::{BodyError, ExceptionHandler, HandlerKind, InstrId, MethodBody};
use crate::instruction::{Instruction, Operand};
use crate::types::TypeSig;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

fn default_max_stack() -> u16 {
    8
}

fn default_init_locals() -> bool {
    true
}

/// Serialized form of a [`MethodBody`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyRepr {
    /// Maximum operand stack depth
    #[serde(default = "default_max_stack")]
    pub max_stack: u16,
    /// Whether locals are zero-initialized
    #[serde(default = "default_init_locals")]
    pub init_locals: bool,
    /// Local slot types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locals: Vec<TypeSig>,
    /// Instructions in program order; targets are positions
    pub instructions: Vec<Instruction>,
    /// Exception handlers; boundaries are positions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<ExceptionHandler>,
}

/// Rewrite every instruction reference in an operand
fn map_operand(operand: &Operand, mut map: impl FnMut(InstrId) -> InstrId) -> Operand {
    match operand {
        Operand::Target(target) => Operand::Target(map(*target)),
        Operand::Switch(targets) => Operand::Switch(targets.iter().map(|t| map(*t)).collect()),
        other => other.clone(),
    }
}

/// Rewrite every instruction reference in a handler
fn map_handler(handler: &ExceptionHandler, mut map: impl FnMut(InstrId) -> InstrId) -> ExceptionHandler {
    let kind = match &handler.kind {
        HandlerKind::Filter { filter_start } => HandlerKind::Filter {
            filter_start: map(*filter_start),
        },
        other => other.clone(),
    };
    ExceptionHandler {
        kind,
        try_start: map(handler.try_start),
        try_end: handler.try_end.map(&mut map),
        handler_start: map(handler.handler_start),
        handler_end: handler.handler_end.map(&mut map),
    }
}

impl From<MethodBody> for BodyRepr {
    fn from(body: MethodBody) -> Self {
        let positions: FxHashMap<InstrId, usize> = body.instructions.positions();
        // A handle that is not in the list encodes past the end and is
        // rejected when read back.
        let to_position = |id: InstrId| {
            InstrId::positional(
                positions
                    .get(&id)
                    .and_then(|p| u32::try_from(*p).ok())
                    .unwrap_or(u32::MAX),
            )
        };

        let instructions = body
            .instructions
            .iter()
            .map(|(_, instr)| Instruction {
                op: instr.op,
                operand: map_operand(&instr.operand, to_position),
            })
            .collect();
        let handlers = body
            .handlers
            .iter()
            .map(|handler| map_handler(handler, to_position))
            .collect();

        Self {
            max_stack: body.max_stack,
            init_locals: body.init_locals,
            locals: body.locals,
            instructions,
            handlers,
        }
    }
}

impl TryFrom<BodyRepr> for MethodBody {
    type Error = BodyError;

    fn try_from(repr: BodyRepr) -> Result<Self, Self::Error> {
        let len = repr.instructions.len();
        let check = |id: InstrId| {
            if id.index() < len {
                Ok(())
            } else {
                Err(BodyError::DanglingReference {
                    position: id.index(),
                    len,
                })
            }
        };

        for instr in &repr.instructions {
            for target in instr.operand.targets() {
                check(target)?;
            }
        }
        for handler in &repr.handlers {
            for boundary in handler.boundaries() {
                check(boundary)?;
            }
        }

        let mut body = MethodBody {
            max_stack: repr.max_stack,
            init_locals: repr.init_locals,
            locals: repr.locals,
            ..MethodBody::default()
        };
        let mut handles = Vec::with_capacity(len);
        for instr in &repr.instructions {
            handles.push(body.instructions.push(Instruction {
                op: instr.op,
                operand: Operand::None,
            })?);
        }
        // Every position was checked above
        let bind = |id: InstrId| handles[id.index()];
        for (handle, instr) in handles.iter().zip(&repr.instructions) {
            if let Some(slot) = body.instructions.get_mut(*handle) {
                slot.operand = map_operand(&instr.operand, bind);
            }
        }
        body.handlers = repr
            .handlers
            .iter()
            .map(|handler| map_handler(handler, bind))
            .collect();
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    #[test]
    fn test_encoding_renumbers_targets_by_position() {
        let mut body = MethodBody::new();
        let ret = body.instructions.push(Instruction::ret()).unwrap();
        let load = body
            .instructions
            .insert_before(ret, Instruction::ldarg(1))
            .unwrap();
        body.instructions
            .insert_before(load, Instruction::branch(Opcode::Br, ret))
            .unwrap();

        let repr = BodyRepr::from(body);

        // br, ldarg.1, ret: the ret now sits at position 2
        assert_eq!(
            repr.instructions[0].operand,
            Operand::Target(InstrId::positional(2))
        );
    }

    #[test]
    fn test_decoded_targets_belong_to_decoded_body() {
        let mut body = MethodBody::new();
        let ret = body.instructions.push(Instruction::ret()).unwrap();
        body.instructions
            .insert_before(ret, Instruction::branch(Opcode::Br, ret))
            .unwrap();

        let decoded = MethodBody::try_from(BodyRepr::from(body)).unwrap();
        let (_, branch) = decoded.instructions.iter().next().unwrap();
        let target = branch.operand.targets()[0];

        assert!(decoded.instructions.contains(target));
        assert_eq!(decoded.instructions.get(target).map(|i| i.op), Some(Opcode::Ret));
        assert_eq!(decoded.instructions.last(), Some(target));
    }

    #[test]
    fn test_decoding_rejects_dangling_target() {
        let repr = BodyRepr {
            max_stack: 8,
            init_locals: true,
            locals: Vec::new(),
            instructions: vec![Instruction::branch(Opcode::Br, InstrId::positional(5)), Instruction::ret()],
            handlers: Vec::new(),
        };

        let result = MethodBody::try_from(repr);
        assert!(matches!(
            result,
            Err(BodyError::DanglingReference { position: 5, len: 2 })
        ));
    }

    #[test]
    fn test_json_body_with_handler() {
        let json = r#"{
            "max_stack": 2,
            "instructions": [
                {"op": "nop"},
                {"op": "leave", "operand": {"target": 4}},
                {"op": "pop"},
                {"op": "leave", "operand": {"target": 4}},
                {"op": "ret"}
            ],
            "handlers": [{
                "kind": {"catch": "object"},
                "try_start": 0,
                "try_end": 2,
                "handler_start": 2,
                "handler_end": 4
            }]
        }"#;

        let body: MethodBody = serde_json::from_str(json).unwrap();
        assert_eq!(body.instructions.len(), 5);
        assert_eq!(body.handlers.len(), 1);
        let handler_start = body.handlers[0].handler_start;
        assert_eq!(body.instructions.get(handler_start).map(|i| i.op), Some(Opcode::Pop));

        let back = serde_json::to_value(&body).unwrap();
        assert_eq!(back["instructions"][1]["operand"]["target"], 4);
        assert_eq!(back["handlers"][0]["try_end"], 2);
    }
}

//! Disassembly
//!
//! Human-readable listings of method bodies for debug logs and test
//! assertions. Instructions are labelled by program-order position
//! (`IL_0000`, `IL_0001`, ...) and branch targets print as labels.

use crate::body::{HandlerKind, InstrId, MethodBody};
use crate::instruction::Operand;
use rustc_hash::FxHashMap;
use std::fmt;

/// Displayable listing of a [`MethodBody`]
pub struct Listing<'a> {
    body: &'a MethodBody,
}

fn label(positions: &FxHashMap<InstrId, usize>, id: InstrId) -> String {
    match positions.get(&id) {
        Some(position) => format!("IL_{:04x}", position),
        None => format!("<dangling {}>", id),
    }
}

fn end_label(positions: &FxHashMap<InstrId, usize>, id: Option<InstrId>) -> String {
    id.map_or_else(|| "end".to_string(), |id| label(positions, id))
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let body = self.body;
        let positions = body.instructions.positions();

        writeln!(f, ".maxstack {}", body.max_stack)?;
        if !body.locals.is_empty() {
            let locals: Vec<String> = body.locals.iter().map(|l| l.full_name()).collect();
            writeln!(f, ".locals ({})", locals.join(", "))?;
        }

        for (position, (_, instr)) in body.instructions.iter().enumerate() {
            write!(f, "IL_{:04x}: ", position)?;
            match &instr.operand {
                Operand::Target(target) => writeln!(f, "{} {}", instr.op, label(&positions, *target))?,
                Operand::Switch(targets) => {
                    let labels: Vec<String> =
                        targets.iter().map(|t| label(&positions, *t)).collect();
                    writeln!(f, "{} ({})", instr.op, labels.join(", "))?
                }
                _ => writeln!(f, "{}", instr)?,
            }
        }

        for handler in &body.handlers {
            let clause = match &handler.kind {
                HandlerKind::Catch(ty) => format!("catch {}", ty),
                HandlerKind::Filter { filter_start } => {
                    format!("filter {}", label(&positions, *filter_start))
                }
                HandlerKind::Finally => "finally".to_string(),
                HandlerKind::Fault => "fault".to_string(),
            };
            writeln!(
                f,
                ".try {} to {} {} handler {} to {}",
                label(&positions, handler.try_start),
                end_label(&positions, handler.try_end),
                clause,
                label(&positions, handler.handler_start),
                end_label(&positions, handler.handler_end),
            )?;
        }

        Ok(())
    }
}

impl MethodBody {
    /// Listing that renders the body on display
    pub fn listing(&self) -> Listing<'_> {
        Listing { body: self }
    }

    /// Render the body as text
    pub fn disassemble(&self) -> String {
        self.listing().to_string()
    }
}

#[cfg(test)]
mod tests {
    use crate::body::{ExceptionHandler, HandlerKind, MethodBody};
    use crate::instruction::Instruction;
    use crate::opcode::Opcode;
    use crate::types::TypeSig;

    #[test]
    fn test_disassemble_labels_branches() {
        let mut body = MethodBody::new();
        let ret = body.instructions.push(Instruction::ret()).unwrap();
        body.instructions
            .insert_before(ret, Instruction::ldarg(1))
            .unwrap();
        body.instructions
            .insert_before(ret, Instruction::branch(Opcode::Brtrue, ret))
            .unwrap();
        body.max_stack = 1;

        assert_eq!(
            body.disassemble(),
            ".maxstack 1\nIL_0000: ldarg.1\nIL_0001: brtrue IL_0002\nIL_0002: ret\n"
        );
    }

    #[test]
    fn test_disassemble_locals_and_handlers() {
        let mut body = MethodBody::from_instructions(vec![
            Instruction::simple(Opcode::Nop),
            Instruction::simple(Opcode::Endfinally),
            Instruction::ret(),
        ]).unwrap();
        body.locals.push(TypeSig::object_array());
        let ids = body.instructions.ids();
        body.handlers.push(ExceptionHandler {
            kind: HandlerKind::Finally,
            try_start: ids[0],
            try_end: Some(ids[1]),
            handler_start: ids[1],
            handler_end: Some(ids[2]),
        });

        let text = body.disassemble();
        assert!(text.contains(".locals (System.Object[])"));
        assert!(text.contains(".try IL_0000 to IL_0001 finally handler IL_0001 to IL_0002"));
    }
}

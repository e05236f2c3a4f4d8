//! Relocatable code fragments.
//!
//! Each AST node lowers to a [`Fragment`]: bytes plus a table of jump
//! operands that are not final yet. Offsets inside a fragment are relative
//! to its first byte; [`Fragment::append`] rebases the appended table and
//! [`Fragment::resolve`] writes absolute addresses once the fragment's
//! place in the program is known.

use crate::bytecode::{Instruction, OpCode};
use crate::span::Span;

/// Where a pending jump should land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// A byte offset relative to the owning fragment.
    Offset(usize),
    /// Just past the innermost enclosing loop.
    Break,
    /// The innermost enclosing loop's condition.
    Continue,
}

/// A 4-byte jump operand awaiting its final address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    /// Offset of the operand's first byte.
    pub site: usize,
    pub target: JumpTarget,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    code: Vec<u8>,
    relocations: Vec<Relocation>,
    positions: Vec<(usize, Span)>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn relocations(&self) -> &[Relocation] {
        &self.relocations
    }

    pub fn emit(&mut self, instruction: Instruction) {
        instruction.encode(&mut self.code);
    }

    /// Emit `instruction`, recording `span` as its source for diagnostics.
    pub fn emit_at(&mut self, instruction: Instruction, span: Span) {
        self.mark(span);
        self.emit(instruction);
    }

    /// Emit a `Jump`/`JumpIfFalse` with a placeholder operand.
    pub fn emit_jump(&mut self, op: OpCode, target: JumpTarget) {
        debug_assert!(matches!(op, OpCode::Jump | OpCode::JumpIfFalse));
        self.code.push(op as u8);
        let site = self.code.len();
        self.code.extend_from_slice(&[0; 4]);
        self.relocations.push(Relocation { site, target });
    }

    pub fn mark(&mut self, span: Span) {
        let offset = self.code.len();
        match self.positions.last_mut() {
            Some((at, last)) if *at == offset => *last = span,
            _ => self.positions.push((offset, span)),
        }
    }

    /// Concatenate `other` after this fragment.
    pub fn append(&mut self, other: Fragment) {
        let base = self.code.len();
        self.code.extend(other.code);
        self.relocations
            .extend(other.relocations.into_iter().map(|r| Relocation {
                site: r.site + base,
                target: match r.target {
                    JumpTarget::Offset(offset) => JumpTarget::Offset(offset + base),
                    other => other,
                },
            }));
        for (offset, span) in other.positions {
            self.positions.push((offset + base, span));
        }
    }

    /// Point every pending `break`/`continue` at concrete offsets.
    pub fn bind_loop_exits(&mut self, continue_to: usize, break_to: usize) {
        for relocation in &mut self.relocations {
            relocation.target = match relocation.target {
                JumpTarget::Break => JumpTarget::Offset(break_to),
                JumpTarget::Continue => JumpTarget::Offset(continue_to),
                target => target,
            };
        }
    }

    /// Write absolute addresses assuming the fragment starts at `base`.
    ///
    /// Fails with the offending relocation if a `break`/`continue` was never
    /// bound to a loop.
    pub fn resolve(mut self, base: usize) -> Result<ResolvedFragment, Relocation> {
        for relocation in &self.relocations {
            let JumpTarget::Offset(offset) = relocation.target else {
                return Err(*relocation);
            };
            let address = (base + offset) as u32;
            self.code[relocation.site..relocation.site + 4].copy_from_slice(&address.to_be_bytes());
        }

        Ok(ResolvedFragment {
            code: self.code,
            positions: self
                .positions
                .into_iter()
                .map(|(offset, span)| (offset + base, span))
                .collect(),
        })
    }
}

/// Final bytes of a fragment placed at a known address.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFragment {
    pub code: Vec<u8>,
    pub positions: Vec<(usize, Span)>,
}

/// The two pieces of lowering an assignable node: evaluate it, or store the
/// value on top of the stack into it.
#[derive(Debug, Clone, Default)]
pub struct CodeGenValue {
    pub load: Fragment,
    pub store: Option<Fragment>,
}

/// Condition and body of one guarded arm, kept apart until the enclosing
/// construct knows every arm's size.
#[derive(Debug, Clone)]
pub struct BranchFragment {
    pub condition: Fragment,
    pub body: Fragment,
}

impl BranchFragment {
    const JUMP_WIDTH: usize = 5;

    pub fn condition_len(&self) -> usize {
        self.condition.len()
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Laid-out size: condition, conditional jump, body, and an optional
    /// trailing unconditional jump.
    pub fn laid_out_len(&self, trailing_jump: bool) -> usize {
        let tail = if trailing_jump { Self::JUMP_WIDTH } else { 0 };
        self.condition_len() + Self::JUMP_WIDTH + self.body_len() + tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_rebases_relocations() {
        let mut head = Fragment::new();
        head.emit(Instruction::PushTrue);

        let mut tail = Fragment::new();
        tail.emit(Instruction::PushNull);
        tail.emit_jump(OpCode::Jump, JumpTarget::Offset(0));

        head.append(tail);
        assert_eq!(
            head.relocations(),
            &[Relocation {
                site: 3,
                target: JumpTarget::Offset(1)
            }]
        );

        let resolved = head.resolve(100).unwrap();
        assert_eq!(&resolved.code[3..7], &101u32.to_be_bytes());
    }

    #[test]
    fn test_unbound_break_fails_to_resolve() {
        let mut fragment = Fragment::new();
        fragment.emit_jump(OpCode::Jump, JumpTarget::Break);
        assert!(fragment.clone().resolve(0).is_err());

        fragment.bind_loop_exits(0, 9);
        let resolved = fragment.resolve(10).unwrap();
        assert_eq!(&resolved.code[1..5], &19u32.to_be_bytes());
    }

    #[test]
    fn test_branch_layout_size() {
        let mut condition = Fragment::new();
        condition.emit(Instruction::PushTrue);
        let mut body = Fragment::new();
        body.emit(Instruction::PushInt(1));
        body.emit(Instruction::Pop);

        let arm = BranchFragment { condition, body };
        assert_eq!(arm.laid_out_len(false), 1 + 5 + 6);
        assert_eq!(arm.laid_out_len(true), 1 + 5 + 6 + 5);
    }
}

//! Lexical scopes, flattened local slots, and the prototype tables.

use indexmap::IndexMap;

use crate::ast::{FunctionDecl, TypeDecl};
use crate::bytecode::{FunctionDescriptor, StructDescriptor};
use crate::lexer::Symbol;

/// Highest slot index encodable in a `GetLocal`/`SetLocal` operand.
pub const MAX_SLOT: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Outermost block of a function (or of the main program).
    Function,
    Plain,
    /// Body of a `while`; the target of `break`/`continue`.
    Loop,
}

/// Names declared in one block; a name's index is its offset in the block.
#[derive(Debug, Clone)]
pub struct BlockContext {
    pub kind: BlockKind,
    names: Vec<Symbol>,
}

impl BlockContext {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            names: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareError {
    /// The name is already declared in the innermost block.
    Duplicate,
    /// The function has run out of slots.
    Exhausted,
}

/// Tracks the active blocks of the function being compiled plus every
/// registered function and structure.
#[derive(Debug, Default)]
pub struct ScopeBuilder {
    blocks: Vec<BlockContext>,
    functions: IndexMap<Symbol, FunctionDescriptor>,
    structs: IndexMap<Symbol, StructDescriptor>,
}

impl ScopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Blocks and slots =====

    /// Start a fresh function context; nothing from the previous one is visible.
    pub fn begin_function(&mut self) {
        self.blocks.clear();
        self.blocks.push(BlockContext::new(BlockKind::Function));
    }

    pub fn open(&mut self, kind: BlockKind) {
        self.blocks.push(BlockContext::new(kind));
    }

    /// Close the innermost block; returns how many slots it held.
    pub fn close(&mut self) -> usize {
        self.blocks.pop().map_or(0, |block| block.len())
    }

    /// Declare `name` in the innermost block and return its slot.
    ///
    /// The slot is the number of names in every enclosing block plus the
    /// index within this one, so simultaneously visible names never share
    /// a slot.
    pub fn declare(&mut self, name: Symbol) -> Result<u8, DeclareError> {
        let live = self.live_slots();
        let Some(block) = self.blocks.last_mut() else {
            return Err(DeclareError::Exhausted);
        };
        if block.names.contains(&name) {
            return Err(DeclareError::Duplicate);
        }
        if live > MAX_SLOT {
            return Err(DeclareError::Exhausted);
        }
        block.names.push(name);
        Ok(live as u8)
    }

    /// Slot of `name`, searching from the innermost block outwards.
    pub fn resolve(&self, name: Symbol) -> Option<u8> {
        let mut base = self.live_slots();
        for block in self.blocks.iter().rev() {
            base -= block.len();
            if let Some(index) = block.names.iter().rposition(|n| *n == name) {
                return Some((base + index) as u8);
            }
        }
        None
    }

    pub fn live_slots(&self) -> usize {
        self.blocks.iter().map(BlockContext::len).sum()
    }

    /// Slots a `break`/`continue` must release: everything declared from
    /// the innermost block out to and including the nearest loop body.
    /// `None` when not inside a loop of the current function.
    pub fn slots_to_loop_exit(&self) -> Option<usize> {
        let mut count = 0;
        for block in self.blocks.iter().rev() {
            count += block.len();
            match block.kind {
                BlockKind::Loop => return Some(count),
                BlockKind::Function => return None,
                BlockKind::Plain => {}
            }
        }
        None
    }

    // ===== Prototypes =====

    /// Register a function; returns its table id, or `None` if the name is taken.
    pub fn register_function(&mut self, decl: &FunctionDecl) -> Option<u32> {
        if self.functions.contains_key(&decl.name) {
            return None;
        }
        let id = self.functions.len() as u32;
        self.functions.insert(
            decl.name,
            FunctionDescriptor {
                name: decl.name,
                params: decl
                    .params
                    .iter()
                    .map(|p| (p.name, p.type_annotation))
                    .collect(),
                offset: 0,
            },
        );
        Some(id)
    }

    pub fn function(&self, name: Symbol) -> Option<(u32, &FunctionDescriptor)> {
        self.functions
            .get_full(&name)
            .map(|(id, _, descriptor)| (id as u32, descriptor))
    }

    pub fn set_function_offset(&mut self, id: u32, offset: usize) {
        if let Some((_, descriptor)) = self.functions.get_index_mut(id as usize) {
            descriptor.offset = offset;
        }
    }

    /// Register a structure; returns its table id, or `None` if the name is taken.
    pub fn register_struct(&mut self, decl: &TypeDecl) -> Option<u32> {
        if self.structs.contains_key(&decl.name) {
            return None;
        }
        let id = self.structs.len() as u32;
        self.structs.insert(
            decl.name,
            StructDescriptor {
                name: decl.name,
                fields: decl.fields.iter().map(|f| (f.name, f.kind)).collect(),
            },
        );
        Some(id)
    }

    pub fn structure(&self, name: Symbol) -> Option<(u32, &StructDescriptor)> {
        self.structs
            .get_full(&name)
            .map(|(id, _, descriptor)| (id as u32, descriptor))
    }

    /// Function and structure tables, in registration order.
    pub fn into_tables(self) -> (Vec<FunctionDescriptor>, Vec<StructDescriptor>) {
        (
            self.functions.into_values().collect(),
            self.structs.into_values().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_blocks_get_distinct_slots() {
        let mut scope = ScopeBuilder::new();
        scope.begin_function();
        assert_eq!(scope.declare(10), Ok(0));
        assert_eq!(scope.declare(11), Ok(1));

        scope.open(BlockKind::Plain);
        assert_eq!(scope.declare(12), Ok(2));
        // Shadowing gets its own slot.
        assert_eq!(scope.declare(10), Ok(3));
        assert_eq!(scope.resolve(10), Some(3));
        assert_eq!(scope.resolve(11), Some(1));
        assert_eq!(scope.close(), 2);

        assert_eq!(scope.resolve(10), Some(0));
        assert_eq!(scope.resolve(12), None);

        // A sibling block reuses the released slots.
        scope.open(BlockKind::Plain);
        assert_eq!(scope.declare(13), Ok(2));
    }

    #[test]
    fn test_duplicate_in_same_block() {
        let mut scope = ScopeBuilder::new();
        scope.begin_function();
        scope.declare(1).unwrap();
        assert_eq!(scope.declare(1), Err(DeclareError::Duplicate));
    }

    #[test]
    fn test_slot_exhaustion() {
        let mut scope = ScopeBuilder::new();
        scope.begin_function();
        for name in 0..=MAX_SLOT as Symbol {
            scope.declare(name).unwrap();
        }
        assert_eq!(scope.declare(9999), Err(DeclareError::Exhausted));
    }

    #[test]
    fn test_loop_exit_counts_enclosing_blocks() {
        let mut scope = ScopeBuilder::new();
        scope.begin_function();
        scope.declare(1).unwrap();
        assert_eq!(scope.slots_to_loop_exit(), None);

        scope.open(BlockKind::Loop);
        scope.declare(2).unwrap();
        scope.open(BlockKind::Plain);
        scope.declare(3).unwrap();
        scope.declare(4).unwrap();
        assert_eq!(scope.slots_to_loop_exit(), Some(3));

        scope.begin_function();
        assert_eq!(scope.slots_to_loop_exit(), None);
    }
}

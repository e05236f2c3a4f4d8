//! Reference-counted object arena.
//!
//! Objects live in slots addressed by [`Handle`]. A handle carries the
//! generation of the slot it was issued for; freeing a slot bumps its
//! generation, so a stale handle is detected instead of aliasing whatever
//! object reuses the slot.
//!
//! Counts track owning stores only (locals, globals, fields, array
//! elements, bound receivers, native storage). Nothing is freed when a
//! count drops to zero; [`Heap::sweep`] does that, skipping pinned handles.
//! Reference cycles keep each other alive and are never collected.

use std::collections::HashSet;

use crate::error::FaultKind;

use super::value::{NativeFunction, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FunctionTarget {
    /// Index into the function table.
    Local(u32),
    Native(NativeFunction),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FunctionRef {
    pub target: FunctionTarget,
    /// Receiver passed as the first argument when the reference is called.
    pub receiver: Option<Handle>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    String(String),
    Array(Vec<Value>),
    Structure {
        type_id: u32,
        fields: Vec<Value>,
    },
    NativeStructure {
        /// Index into the machine's native structure registry.
        kind: usize,
        storage: Vec<Value>,
    },
    Function(FunctionRef),
}

impl Object {
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::String(_) => "string",
            Object::Array(_) => "array",
            Object::Structure { .. } => "structure",
            Object::NativeStructure { .. } => "native structure",
            Object::Function(_) => "function",
        }
    }

    /// Handles this object owns a count on.
    fn children(&self) -> Vec<Handle> {
        match self {
            Object::String(_) => Vec::new(),
            Object::Array(values)
            | Object::Structure { fields: values, .. }
            | Object::NativeStructure {
                storage: values, ..
            } => values.iter().filter_map(Value::as_handle).collect(),
            Object::Function(function) => function.receiver.into_iter().collect(),
        }
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    refcount: usize,
    object: Option<Object>,
}

/// Counters for retain/release traffic and collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub allocations: usize,
    pub retains: usize,
    pub releases: usize,
    pub swept: usize,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    since_sweep: usize,
    stats: HeapStats,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn stats(&self) -> HeapStats {
        self.stats
    }

    pub fn allocations_since_sweep(&self) -> usize {
        self.since_sweep
    }

    /// Store `object` with a count of zero.
    pub fn allocate(&mut self, object: Object) -> Handle {
        self.live += 1;
        self.since_sweep += 1;
        self.stats.allocations += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.refcount = 0;
            slot.object = Some(object);
            return Handle {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            refcount: 0,
            object: Some(object),
        });
        Handle {
            index,
            generation: 0,
        }
    }

    fn slot(&self, handle: Handle) -> Result<&Slot, FaultKind> {
        match self.slots.get(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.object.is_some() => {
                Ok(slot)
            }
            _ => Err(FaultKind::StaleHandle),
        }
    }

    fn slot_mut(&mut self, handle: Handle) -> Result<&mut Slot, FaultKind> {
        match self.slots.get_mut(handle.index as usize) {
            Some(slot) if slot.generation == handle.generation && slot.object.is_some() => {
                Ok(slot)
            }
            _ => Err(FaultKind::StaleHandle),
        }
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.slot(handle).is_ok()
    }

    pub fn get(&self, handle: Handle) -> Result<&Object, FaultKind> {
        self.slot(handle)?
            .object
            .as_ref()
            .ok_or(FaultKind::StaleHandle)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Result<&mut Object, FaultKind> {
        self.slot_mut(handle)?
            .object
            .as_mut()
            .ok_or(FaultKind::StaleHandle)
    }

    pub fn refcount(&self, handle: Handle) -> Option<usize> {
        self.slot(handle).ok().map(|slot| slot.refcount)
    }

    /// Take a count on `value` if it is a heap reference.
    pub fn retain(&mut self, value: &Value) -> Result<(), FaultKind> {
        if let Value::Object(handle) = value {
            self.slot_mut(*handle)?.refcount += 1;
            self.stats.retains += 1;
        }
        Ok(())
    }

    /// Drop a count on `value` if it is a heap reference.
    pub fn release(&mut self, value: &Value) -> Result<(), FaultKind> {
        if let Value::Object(handle) = value {
            let slot = self.slot_mut(*handle)?;
            slot.refcount = slot.refcount.saturating_sub(1);
            self.stats.releases += 1;
        }
        Ok(())
    }

    /// Overwrite `slot` with `value`, moving a count from the old value to
    /// the new one.
    pub fn replace(&mut self, slot: &mut Value, value: Value) -> Result<(), FaultKind> {
        self.retain(&value)?;
        let old = std::mem::replace(slot, value);
        self.release(&old)
    }

    /// Store into an owned element of an array, structure or native
    /// structure.
    pub fn set_element(
        &mut self,
        handle: Handle,
        index: usize,
        value: Value,
    ) -> Result<(), FaultKind> {
        let old = {
            let values = match self.get_mut(handle)? {
                Object::Array(values)
                | Object::Structure { fields: values, .. }
                | Object::NativeStructure {
                    storage: values, ..
                } => values,
                other => {
                    return Err(FaultKind::TypeMismatch {
                        op: "[]=",
                        left: other.type_name(),
                        right: value.type_name(),
                    })
                }
            };
            let length = values.len();
            let element = values
                .get_mut(index)
                .ok_or(FaultKind::IndexOutOfBounds {
                    index: index as i64,
                    length,
                })?;
            std::mem::replace(element, value)
        };
        self.retain(&value)?;
        self.release(&old)
    }

    /// Free every unpinned object whose count is zero.
    ///
    /// Freeing an object releases its children; a child that drops to zero
    /// is freed in the same pass. Returns the number of objects freed.
    pub fn sweep(&mut self, pinned: &HashSet<Handle>) -> usize {
        let mut worklist: Vec<Handle> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.object.is_some() && slot.refcount == 0)
            .map(|(index, slot)| Handle {
                index: index as u32,
                generation: slot.generation,
            })
            .filter(|handle| !pinned.contains(handle))
            .collect();
        worklist.reverse();

        let mut freed = 0;
        while let Some(handle) = worklist.pop() {
            let Ok(slot) = self.slot_mut(handle) else {
                continue;
            };
            if slot.refcount > 0 {
                continue;
            }
            let Some(object) = slot.object.take() else {
                continue;
            };
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(handle.index);
            self.live -= 1;
            freed += 1;
            log::trace!("freed {} at slot {}", object.type_name(), handle.index);

            for child in object.children() {
                let Ok(slot) = self.slot_mut(child) else {
                    continue;
                };
                slot.refcount = slot.refcount.saturating_sub(1);
                let now_zero = slot.refcount == 0;
                self.stats.releases += 1;
                if now_zero && !pinned.contains(&child) {
                    worklist.push(child);
                }
            }
        }

        self.since_sweep = 0;
        self.stats.swept += freed;
        freed
    }
}

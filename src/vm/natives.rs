//! Native prelude and the native structure registry.
//!
//! Natives follow the bridge contract in [`NativeFn`]: pop every argument,
//! push at most one result, and move counts for anything stored.

use indexmap::IndexMap;

use crate::error::FaultKind;

use super::heap::{Handle, Object};
use super::machine::{FaultResult, Machine};
use super::value::{NativeFn, NativeFunction, Value};

/// Methods of a host-defined structure.
#[derive(Debug, Clone, Default)]
pub struct NativeStructureDef {
    pub methods: IndexMap<String, NativeFunction>,
}

pub(super) fn install(machine: &mut Machine) {
    machine.register_native("print", print);
    machine.register_native("len", len);
    machine.register_native("str", stringify);
    machine.register_native("array", array);
    machine.register_native("gc", gc);

    machine.register_native("List", list_new);
    machine.register_native_structure(
        "List",
        &[
            ("push", list_push),
            ("pop", list_pop),
            ("get", list_get),
            ("len", list_len),
        ],
    );
}

impl Machine {
    pub fn register_native_structure(
        &mut self,
        name: &str,
        methods: &[(&'static str, NativeFn)],
    ) {
        let methods = methods
            .iter()
            .map(|(method, func)| (method.to_string(), NativeFunction::new(method, *func)))
            .collect();
        self.native_structures
            .insert(name.to_string(), NativeStructureDef { methods });
    }

    /// Allocate an empty instance of a registered native structure.
    pub fn instantiate(&mut self, name: &str) -> FaultResult<Handle> {
        let kind = self
            .native_structures
            .get_index_of(name)
            .ok_or_else(|| FaultKind::UnknownNativeStructure(name.to_string()))?;
        Ok(self.heap.allocate(Object::NativeStructure {
            kind,
            storage: Vec::new(),
        }))
    }

    /// Pop exactly `N` arguments, first argument first.
    pub fn arguments<const N: usize>(&mut self, argc: usize) -> FaultResult<[Value; N]> {
        let values = self.pop_n(argc)?;
        <[Value; N]>::try_from(values).map_err(|values| FaultKind::WrongArity {
            expected: N,
            got: values.len(),
        })
    }

    fn native_argument(
        &self,
        native: &'static str,
        expected: &'static str,
        found: Value,
    ) -> FaultKind {
        FaultKind::NativeArgument {
            native,
            expected,
            found: self.kind_name(found),
        }
    }
}

fn print(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    let arguments = machine.pop_n(argc)?;
    let line = arguments
        .into_iter()
        .map(|value| machine.display(value))
        .collect::<Vec<_>>()
        .join(" ");
    if machine.config.echo {
        println!("{}", line);
    }
    machine.output.push(line);
    Ok(())
}

fn len(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    let [value] = machine.arguments(argc)?;
    let length = match value.as_handle().map(|h| machine.heap.get(h)) {
        Some(Ok(Object::String(s))) => s.len(),
        Some(Ok(Object::Array(values))) => values.len(),
        Some(Ok(Object::NativeStructure { storage, .. })) => storage.len(),
        _ => return Err(machine.native_argument("len", "string or array", value)),
    };
    machine.push(Value::Int(length as i32))
}

fn stringify(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    let [value] = machine.arguments(argc)?;
    let text = machine.display(value);
    let value = machine.alloc_string(text);
    machine.push(value)
}

fn array(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    let [size] = machine.arguments(argc)?;
    let length = match size.as_index() {
        Some(n) if n >= 0 => n as usize,
        _ => return Err(machine.native_argument("array", "a non-negative size", size)),
    };
    let handle = machine
        .heap
        .allocate(Object::Array(vec![Value::Null; length]));
    machine.push(Value::Object(handle))
}

fn gc(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    machine.arguments::<0>(argc)?;
    let freed = machine.collect_garbage();
    machine.push(Value::Int(freed as i32))
}

fn list_new(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    machine.arguments::<0>(argc)?;
    let handle = machine.instantiate("List")?;
    machine.push(Value::Object(handle))
}

/// Storage of a `List` receiver.
fn list_storage<'m>(
    machine: &'m mut Machine,
    native: &'static str,
    receiver: Value,
) -> FaultResult<&'m mut Vec<Value>> {
    let found = machine.kind_name(receiver);
    let mismatch = FaultKind::NativeArgument {
        native,
        expected: "List",
        found,
    };
    let handle = receiver.as_handle().ok_or_else(|| mismatch.clone())?;
    match machine.heap.get_mut(handle)? {
        Object::NativeStructure { storage, .. } => Ok(storage),
        _ => Err(mismatch),
    }
}

fn list_push(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    let [receiver, value] = machine.arguments(argc)?;
    list_storage(machine, "push", receiver)?.push(value);
    machine.heap.retain(&value)
}

fn list_pop(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    let [receiver] = machine.arguments(argc)?;
    let value = list_storage(machine, "pop", receiver)?
        .pop()
        .unwrap_or(Value::Null);
    // The popped value now lives only on the operand stack.
    machine.heap.release(&value)?;
    machine.push(value)
}

fn list_get(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    let [receiver, index] = machine.arguments(argc)?;
    let Some(position) = index.as_index() else {
        return Err(machine.native_argument("get", "an integer index", index));
    };
    let storage = list_storage(machine, "get", receiver)?;
    let length = storage.len();
    let value = usize::try_from(position)
        .ok()
        .and_then(|i| storage.get(i).copied())
        .ok_or(FaultKind::IndexOutOfBounds {
            index: position,
            length,
        })?;
    machine.push(value)
}

fn list_len(machine: &mut Machine, argc: usize) -> FaultResult<()> {
    let [receiver] = machine.arguments(argc)?;
    let length = list_storage(machine, "len", receiver)?.len();
    machine.push(Value::Int(length as i32))
}

use pretty_assertions::assert_eq;

use super::*;
use crate::compiler::compile;
use crate::error::{FaultKind, RuntimeFault};
use crate::lexer::Scanner;
use crate::parser::Parser;

fn quiet() -> MachineConfig {
    MachineConfig {
        echo: false,
        ..MachineConfig::default()
    }
}

fn machine_with(source: &str, config: MachineConfig) -> Machine {
    let (tokens, pool) = Scanner::new(source).scan_tokens().unwrap();
    let program = Parser::new(tokens, &pool).parse().unwrap();
    let bytecode = compile(&program, pool).unwrap();
    Machine::new(bytecode, config)
}

fn run_source(source: &str) -> Vec<String> {
    let mut machine = machine_with(source, quiet());
    machine.run().unwrap();
    machine.output
}

fn run_fault(source: &str) -> RuntimeFault {
    machine_with(source, quiet()).run().unwrap_err()
}

#[test]
fn test_print_sum() {
    assert_eq!(run_source("let a = 1; let b = 2; print(a + b);"), vec!["3"]);
}

#[test]
fn test_if_else() {
    assert_eq!(
        run_source("if (1 < 2) { print(1); } else { print(2); }"),
        vec!["1"]
    );
    assert_eq!(
        run_source("let x = 3; if (x == 1) { print(1); } elif (x == 3) { print(3); } else { print(0); }"),
        vec!["3"]
    );
}

#[test]
fn test_recursive_factorial() {
    let source = "func fact(n){ if (n < 2) { return 1; } return n * fact(n - 1); } print(fact(5));";
    assert_eq!(run_source(source), vec!["120"]);
}

#[test]
fn test_while_counts_up() {
    assert_eq!(
        run_source("let i = 0; while (i < 3) { print(i); i = i + 1; }"),
        vec!["0", "1", "2"]
    );
}

#[test]
fn test_break_and_continue_release_locals() {
    let source = "
        let i = 0;
        let total = 0;
        while (i < 10) {
            i += 1;
            let square = i * i;
            if (i % 2 == 0) { continue; }
            if (i > 7) { break; }
            total += square;
        }
        print(total);
    ";
    let mut machine = machine_with(source, quiet());
    machine.run().unwrap();
    assert_eq!(machine.output, vec!["84"]);
    // Only `i` and `total` remain.
    assert_eq!(machine.local(1), Some(Value::Int(84)));
    assert_eq!(machine.local(2), None);
}

#[test]
fn test_array_index_out_of_bounds_faults() {
    let fault = run_fault("let a = [1];\nprint(a[4]);");
    assert_eq!(
        fault.kind,
        FaultKind::IndexOutOfBounds {
            index: 4,
            length: 1
        }
    );
    assert_eq!(fault.span.map(|span| span.line), Some(2));

    let fault = run_fault("let a = array(2); a[-1] = 3;");
    assert_eq!(
        fault.kind,
        FaultKind::IndexOutOfBounds {
            index: -1,
            length: 2
        }
    );
}

#[test]
fn test_overwrite_moves_counts() {
    let mut machine = machine_with("let a = [1]; let b = [2]; a = b;", quiet());
    machine.run().unwrap();

    // Two initial stores plus one for the overwrite; one release of the old array.
    let stats = machine.heap().stats();
    assert_eq!(stats.retains, 3);
    assert_eq!(stats.releases, 1);

    let shared = machine.local(1).and_then(|v| v.as_handle()).unwrap();
    assert_eq!(machine.local(0), Some(Value::Object(shared)));
    assert_eq!(machine.heap().refcount(shared), Some(2));
}

#[test]
fn test_field_overwrite_frees_old_value() {
    let source = "type P { x } let p = P([1]); p.x = [2]; print(gc());";
    assert_eq!(run_source(source), vec!["1"]);
}

#[test]
fn test_gc_keeps_reachable_objects() {
    let source = "let keep = [1, 2]; let tmp = [3]; tmp = null; print(gc(), keep[1]);";
    assert_eq!(run_source(source), vec!["1 2"]);
}

#[test]
fn test_automatic_collection() {
    let config = MachineConfig {
        gc_threshold: 4,
        ..quiet()
    };
    let mut machine = machine_with(
        "let i = 0; while (i < 100) { let t = [i]; i += 1; }",
        config,
    );
    machine.run().unwrap();
    assert!(machine.heap().len() < 10);
    assert!(machine.heap().stats().swept >= 90);
}

#[test]
fn test_structures() {
    let source = "
        type Point { x: int, y: float, tag }
        let p = Point(1);
        print(p.x, p.y, p.tag);
        p.tag = \"origin\";
        p.y = p.y + 2.5;
        print(p);
    ";
    assert_eq!(
        run_source(source),
        vec!["1 0.0 null", "Point { x: 1, y: 2.5, tag: origin }"]
    );
}

#[test]
fn test_globals_shared_with_functions() {
    let source = "counter = 1; func bump() { counter = counter + 1; } bump(); bump(); print(counter);";
    assert_eq!(run_source(source), vec!["3"]);
}

#[test]
fn test_function_values() {
    let source = "func twice(x) { return x * 2; } let f = twice; print(f(21));";
    assert_eq!(run_source(source), vec!["42"]);
}

#[test]
fn test_calls_yield_one_value() {
    assert_eq!(run_source("print(print(1));"), vec!["1", "null"]);
    assert_eq!(
        run_source("func nothing() { } print(nothing());"),
        vec!["null"]
    );
}

#[test]
fn test_numeric_promotion_and_strings() {
    assert_eq!(
        run_source("print(1 + 2.5, 7u / 2, 'a' + 1, 0xFFu & 15u);"),
        vec!["3.5 3 98 15"]
    );
    assert_eq!(run_source("print(\"a\" + 1 + 'c');"), vec!["a1c"]);
    assert_eq!(
        run_source("print(\"ab\" == \"ab\", [1] == [1], 2 == 2.0);"),
        vec!["true false true"]
    );
    assert_eq!(run_source("print(len(\"four\"), str(12) + \"!\");"), vec!["4 12!"]);
}

#[test]
fn test_arithmetic_is_left_associative() {
    let source = "print(8 / 4 / 2); print(2 * 3 % 4); print(100 / 10 * 2); print(10 - 3 - 2);";
    assert_eq!(run_source(source), vec!["1", "2", "20", "5"]);
}

#[test]
fn test_most_negative_int() {
    // The literal magnitude must fit i32 before negation.
    assert_eq!(run_source("print(-2147483647 - 1);"), vec!["-2147483648"]);
}

#[test]
fn test_debug_summary() {
    let mut machine = machine_with("let a = [1]; print(a);", quiet());
    machine.run().unwrap();
    let summary = format!("{:?}", machine);
    assert!(summary.starts_with("Machine {"));
    assert!(summary.contains("state: Halted"));
    assert!(summary.contains("call_depth: 0"));
    assert!(summary.contains(&format!("live_objects: {}", machine.heap().len())));
}

#[test]
fn test_native_list() {
    let source = "
        let l = List();
        l.push(1);
        l.push(\"two\");
        print(l.len(), l.get(1), l.pop(), l.len());
    ";
    assert_eq!(run_source(source), vec!["2 two two 1"]);
}

#[test]
fn test_bound_native_method() {
    let source = "let l = List(); let push = l.push; push(5); print(l.get(0), len(l));";
    assert_eq!(run_source(source), vec!["5 1"]);
}

#[test]
fn test_unknown_native_structure() {
    let mut machine = machine_with("", quiet());
    assert_eq!(
        machine.instantiate("Map"),
        Err(FaultKind::UnknownNativeStructure("Map".to_string()))
    );
    assert!(machine.instantiate("List").is_ok());
}

#[test]
fn test_runtime_faults() {
    assert_eq!(
        run_fault("print(missing);").kind,
        FaultKind::UndefinedGlobal("missing".to_string())
    );
    assert_eq!(run_fault("let a = 1 / 0;").kind, FaultKind::DivisionByZero);
    assert_eq!(
        run_fault("let a = [1] - 1;").kind,
        FaultKind::TypeMismatch {
            op: "-",
            left: "array",
            right: "int"
        }
    );
    assert_eq!(
        run_fault("let a = [1]; a.push(2);").kind,
        FaultKind::InvalidMethod("push".to_string())
    );
    assert_eq!(
        run_fault("type P { x } let p = P(1); print(p.z);").kind,
        FaultKind::InvalidField("z".to_string())
    );
    assert_eq!(
        run_fault("func f(a) { } let g = f; g(1, 2);").kind,
        FaultKind::WrongArity {
            expected: 1,
            got: 2
        }
    );
    assert_eq!(
        run_fault("let x = 3; x(1);").kind,
        FaultKind::NotCallable("int")
    );
    assert_eq!(
        run_fault("len(1);").kind,
        FaultKind::NativeArgument {
            native: "len",
            expected: "string or array",
            found: "int"
        }
    );
}

#[test]
fn test_call_depth_limit() {
    let config = MachineConfig {
        max_call_depth: 64,
        ..quiet()
    };
    let fault = machine_with("func f(n) { return f(n + 1); } f(0);", config)
        .run()
        .unwrap_err();
    assert_eq!(fault.kind, FaultKind::CallDepthExceeded(64));
}

#[test]
fn test_single_stepping() {
    let mut machine = machine_with("let a = 1;", quiet());
    assert_eq!(machine.step().unwrap(), StepState::Ready);
    assert_eq!(machine.step().unwrap(), StepState::Ready);
    assert_eq!(machine.local(0), Some(Value::Int(1)));
    assert_eq!(machine.step().unwrap(), StepState::Halted);
    assert_eq!(machine.step().unwrap(), StepState::Halted);
}

#[test]
fn test_top_level_return_halts() {
    assert_eq!(run_source("print(1); return; print(2);"), vec!["1"]);
}

#[test]
fn test_invalid_opcode() {
    let mut bytecode = crate::bytecode::Bytecode::default();
    bytecode.code = vec![0xEE];
    let fault = Machine::new(bytecode, quiet()).run().unwrap_err();
    assert_eq!(fault.kind, FaultKind::InvalidOpcode(0xEE));
    assert_eq!(fault.pc, 0);
}

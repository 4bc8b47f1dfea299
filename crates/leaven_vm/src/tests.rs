//! Tests for the leaven virtual machine.

use leaven_core::{Code, Instr, Operand, Register, Value, ValueKind};

use crate::io::VecOutput;
use crate::runner::{Error, run_source};
use crate::vm::Machine;

fn machine(codes: Vec<Code>) -> Machine<VecOutput> {
    Machine::new(codes, VecOutput::new())
}

#[test]
fn test_push_add_halt() {
    let mut vm = machine(vec![
        Code::Label("main".to_string()),
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(5))),
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(3))),
        Code::Instr(Instr::Add(ValueKind::I32)),
        Code::Instr(Instr::Halt),
    ]);

    vm.run().unwrap();
    assert_eq!(vm.stack(), &[Value::I32(8)]);
}

#[test]
fn test_sub_operand_order() {
    let mut vm = machine(vec![
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(10))),
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(4))),
        Code::Instr(Instr::Sub(ValueKind::I32)),
        Code::Instr(Instr::Halt),
    ]);

    vm.run().unwrap();
    assert_eq!(vm.stack(), &[Value::I32(6)]);
}

#[test]
fn test_jz_on_zero_jumps() {
    let mut vm = machine(vec![
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(0))),
        Code::Instr(Instr::Jz("end".to_string())),
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(99))),
        Code::Label("end".to_string()),
        Code::Instr(Instr::Halt),
    ]);

    vm.run().unwrap();
    assert!(vm.stack().is_empty(), "the branch should have been skipped");
}

#[test]
fn test_jz_on_nonzero_falls_through() {
    let mut vm = machine(vec![
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(7))),
        Code::Instr(Instr::Jz("end".to_string())),
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(99))),
        Code::Label("end".to_string()),
        Code::Instr(Instr::Halt),
    ]);

    vm.run().unwrap();
    assert_eq!(vm.stack(), &[Value::I32(99)]);
}

#[test]
fn test_store_and_load() {
    let mut vm = machine(vec![
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(12))),
        Code::Instr(Instr::Store(ValueKind::I32, "main.x".to_string())),
        Code::Instr(Instr::Load(ValueKind::I32, "main.x".to_string())),
        Code::Instr(Instr::Halt),
    ]);

    vm.run().unwrap();
    assert_eq!(vm.stack(), &[Value::I32(12)]);
    assert_eq!(vm.slot("main.x"), Some(&Value::I32(12)));
}

// The full calling convention, hand-assembled: a one-parameter function
// that adds one to its argument.
#[test]
fn test_call_convention_round_trip() {
    let mut vm = machine(vec![
        // main
        Code::Label("main".to_string()),
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(41))),
        Code::Instr(Instr::Call("fn".to_string())),
        Code::Instr(Instr::Halt),
        // fn
        Code::Label("fn".to_string()),
        Code::Instr(Instr::Frame(1)),
        Code::Instr(Instr::Swap),
        Code::Instr(Instr::Store(ValueKind::I32, "fn.x".to_string())),
        Code::Instr(Instr::Stw(Register::Ebp)),
        Code::Instr(Instr::Stw(Register::Esp)),
        Code::Instr(Instr::Ldw(Register::Ebp)),
        Code::Instr(Instr::Load(ValueKind::I32, "fn.x".to_string())),
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(1))),
        Code::Instr(Instr::Add(ValueKind::I32)),
        Code::Instr(Instr::Ldw(Register::Rt)),
        Code::Instr(Instr::Stw(Register::Ebp)),
        Code::Instr(Instr::Ldw(Register::Esp)),
        Code::Instr(Instr::Ldw(Register::Ebp)),
        Code::Instr(Instr::Stw(Register::Rt)),
        Code::Instr(Instr::Swap),
        Code::Instr(Instr::Ret),
    ]);

    vm.run().unwrap();
    assert_eq!(vm.stack(), &[Value::I32(42)]);
}

#[test]
fn test_call0_through_jm() {
    let mut vm = machine(vec![
        Code::Label("main".to_string()),
        Code::Instr(Instr::Mov(Register::Jm, Some(Operand::Id("fn".to_string())))),
        Code::Instr(Instr::Call0),
        Code::Instr(Instr::Halt),
        Code::Label("fn".to_string()),
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(5))),
        Code::Instr(Instr::Swap),
        Code::Instr(Instr::Ret),
    ]);

    vm.run().unwrap();
    assert_eq!(vm.stack(), &[Value::I32(5)]);
}

#[test]
fn test_constant_pool_push_and_concat() {
    let mut vm = machine(vec![
        Code::Instr(Instr::Push(ValueKind::Const, Operand::Id("str-a".to_string()))),
        Code::Instr(Instr::Push(ValueKind::Const, Operand::Id("str-b".to_string()))),
        Code::Instr(Instr::Concat),
        Code::Instr(Instr::Println),
        Code::Instr(Instr::Halt),
        Code::Value(ValueKind::Str, "str-a".to_string(), Operand::Str("foo".to_string())),
        Code::Value(ValueKind::Str, "str-b".to_string(), Operand::Str("bar".to_string())),
    ]);

    vm.run().unwrap();
    assert_eq!(vm.output.lines, vec!["foobar"]);
}

#[test]
fn test_frame_underflow_faults() {
    let mut vm = machine(vec![Code::Instr(Instr::Frame(2))]);
    let err = vm.run().unwrap_err();
    assert!(err.message.contains("underflow"), "got: {}", err.message);
    assert_eq!(err.registers.pc, 0);
}

#[test]
fn test_frame_init_faults() {
    let mut vm = machine(vec![Code::Instr(Instr::FrameInit(0))]);
    let err = vm.run().unwrap_err();
    assert!(err.message.contains("frame_init"), "got: {}", err.message);
}

#[test]
fn test_esp_cannot_grow_stack() {
    let mut vm = machine(vec![
        Code::Instr(Instr::Mov(Register::Esp, Some(Operand::I32(4)))),
    ]);
    let err = vm.run().unwrap_err();
    assert!(err.message.contains("esp"), "got: {}", err.message);
}

#[test]
fn test_runtime_error_backtrace_marks_instruction() {
    let mut vm = machine(vec![
        Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(1))),
        Code::Instr(Instr::Swap),
    ]);
    let err = vm.run().unwrap_err();
    let backtrace = err.backtrace();
    assert!(backtrace.contains(">    1  swap"), "got:\n{backtrace}");
    assert!(backtrace.contains("registers:"), "got:\n{backtrace}");
}

// End-to-end scenarios through the full pipeline.

#[test]
fn test_scenario_println_sum() {
    let result = run_source("s1.lv", "begin println(1 + 2) end").unwrap();
    assert_eq!(result.output, vec!["3"]);
    assert_eq!(result.stack_top, Some(Value::I32(3)));
}

#[test]
fn test_scenario_let_bound_lambda() {
    let result =
        run_source("s2.lv", "let add = func (a, b) = a + b in add(4, 5)").unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(9)));
}

#[test]
fn test_scenario_factorial() {
    let source = "let fact = func (n) = if n then n * fact(n - 1) else 1 in fact(5)";
    let result = run_source("s3.lv", source).unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(120)));
}

#[test]
fn test_scenario_if_treats_nonzero_as_true() {
    let result = run_source("s3b.lv", "if 2 then 10 else 20").unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(10)));

    let result = run_source("s3c.lv", "if 0 then 10 else 20").unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(20)));
}

#[test]
fn test_scenario_returned_lambda() {
    let source = "let f = func () = func (x) = x + x in f()(7)";
    let result = run_source("s4.lv", source).unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(14)));
}

#[test]
fn test_scenario_invalid_let_reports_missing_token() {
    let err = run_source("s5.lv", "let x = in x").expect_err("missing binding value");
    let Error::Compile(leaven_error::CompileError::Syntax(
        leaven_error::SyntaxError::MissingExpectedToken { found, .. },
    )) = err
    else {
        panic!("expected a missing-token error, got: {err:?}");
    };
    assert_eq!(found, "`in`");
}

#[test]
fn test_scenario_inline_opcode() {
    let source = "opcode(%{push I32 #7\nhalt})";
    let result = run_source("s6.lv", source).unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(7)));
}

#[test]
fn test_scenario_string_concat_operator() {
    let result = run_source("cat.lv", "begin println(%{foo} ++ %{bar}) end").unwrap();
    assert_eq!(result.output, vec!["foobar"]);
}

#[test]
fn test_scenario_lambda_in_branch() {
    let source = "let f = if true then func (x) = x + 1 else func (x) = x - 1 in f(9)";
    let result = run_source("branch.lv", source).unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(10)));
}

#[test]
fn test_scenario_call_result_of_begin() {
    let source = "(begin func (x) = x + x end)(3)";
    let result = run_source("crob.lv", source).unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(6)));
}

#[test]
fn test_scenario_def_and_call() {
    let source = "def double(x) = x + x\ndouble(21)";
    let result = run_source("def.lv", source).unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(42)));
}

#[test]
fn test_scenario_symbols_push_through_pool() {
    let result = run_source("sym.lv", "'hello").unwrap();
    assert_eq!(result.stack_top, Some(Value::Symbol("hello".to_string())));
}

#[test]
fn test_scenario_def_name_as_value_loads_through_pool() {
    // `one` is never stored in a slot; loading it falls back to the
    // constant-pool reference emitted by the definition.
    let source = "def one() = 1\nlet g = one in g()";
    let result = run_source("pool.lv", source).unwrap();
    assert_eq!(result.stack_top, Some(Value::I32(1)));
}

#[test]
fn test_scenario_undeclared_identifier() {
    let err = run_source("undecl.lv", "missing").expect_err("unknown identifier");
    assert!(
        matches!(
            err,
            Error::Compile(leaven_error::CompileError::Generator(
                leaven_error::GeneratorError::UndeclaredIdentifier { .. }
            ))
        ),
        "got: {err:?}"
    );
}

//! Tests for the leaven compiler.

use std::collections::HashSet;

use leaven_core::{Code, Instr, Operand, Register, ValueKind};
use leaven_error::{CompileError, GeneratorError, Loc};

use crate::ir::{self, Ir, IrBinding};
use crate::output::{self, Item};
use crate::scope::{ScopeKind, ScopeTree};
use crate::{asm, codegen, compile, compile_bare, pass};

fn compile_ok(source: &str) -> Vec<Code> {
    compile("test.lv", source).expect("compilation should succeed")
}

fn generator_err(source: &str) -> GeneratorError {
    match compile_bare("test.lv", source).expect_err("compilation should fail") {
        CompileError::Generator(err) => err,
        err => panic!("expected a generator error, got: {err:?}"),
    }
}

fn lift_source(source: &str) -> Vec<Ir> {
    let (tree, _) = leaven_parser::read("test.lv", source).expect("parsing should succeed");
    ir::lift(tree)
}

fn dummy_ir() -> Ir {
    Ir::Num { lexeme: "1".to_string(), loc: Loc::new("test.lv", 0) }
}

// Lowering

#[test]
fn test_lift_rewrites_binop_into_app() {
    let lowered = lift_source("operator('infix, 6, '+)\na + b");
    let [Ir::App { func, args, .. }] = lowered.as_slice() else {
        panic!("expected an application, got: {lowered:?}");
    };
    assert!(matches!(func.as_ref(), Ir::Id { name, .. } if name == "+"));
    assert_eq!(args.len(), 2);
}

#[test]
fn test_lift_rewrites_uniop_into_app() {
    let lowered = lift_source("operator('prefix, 9, '!)\n! a");
    let [Ir::App { func, args, .. }] = lowered.as_slice() else {
        panic!("expected an application, got: {lowered:?}");
    };
    assert!(matches!(func.as_ref(), Ir::Id { name, .. } if name == "!"));
    assert_eq!(args.len(), 1);
}

#[test]
fn test_lift_booleans() {
    let lowered = lift_source("true false");
    assert!(matches!(lowered[0], Ir::Bool { value: true, .. }));
    assert!(matches!(lowered[1], Ir::Bool { value: false, .. }));
}

#[test]
fn test_lift_lambda_pointers() {
    let lowered = lift_source("func () = 1 func () = 2");
    let ptrs: Vec<&str> = lowered
        .iter()
        .map(|node| match node {
            Ir::Lambda { ptr, .. } => ptr.as_str(),
            node => panic!("expected a lambda, got: {node:?}"),
        })
        .collect();

    assert_ne!(ptrs[0], ptrs[1]);
    for ptr in ptrs {
        let suffix = ptr.strip_prefix("lambda-").expect("pointer prefix");
        assert_eq!(suffix.len(), 16);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

// Dead-lambda elimination

#[test]
fn test_dead_lambda_removed() {
    let pruned =
        pass::eliminate_dead_lambdas(lift_source("def unused() = 1\ndef used() = 2\nused()"));
    let names: Vec<&str> = pruned
        .iter()
        .filter_map(|node| match node {
            Ir::Def { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["used"]);
}

#[test]
fn test_dead_lambda_self_recursion_keeps_definition() {
    let pruned = pass::eliminate_dead_lambdas(lift_source("def spin() = spin()\n1"));
    assert!(
        pruned.iter().any(|node| matches!(node, Ir::Def { name, .. } if name == "spin")),
        "a self-recursive definition counts as referenced"
    );
}

#[test]
fn test_dead_lambda_cannot_see_through_dead_references() {
    // `helper` is only referenced from `unused`, which is itself dead;
    // the pass does not iterate, so `helper` survives.
    let source = "def helper() = 1\ndef unused() = helper()\n2";
    let pruned = pass::eliminate_dead_lambdas(lift_source(source));
    assert!(pruned.iter().any(|node| matches!(node, Ir::Def { name, .. } if name == "helper")));
    assert!(!pruned.iter().any(|node| matches!(node, Ir::Def { name, .. } if name == "unused")));
}

#[test]
fn test_dead_lambda_ignores_non_lambda_defs() {
    let pruned = pass::eliminate_dead_lambdas(lift_source("def x = 1\n2"));
    assert!(pruned.iter().any(|node| matches!(node, Ir::Def { name, .. } if name == "x")));
}

// Scope

#[test]
fn test_scope_qualification() {
    let (mut scopes, root) = ScopeTree::new("main");
    scopes.define(root, "x", dummy_ir());

    let forked = scopes.forked(root, "lambda-1");
    assert!(scopes.contains(forked, "x"));
    assert_eq!(scopes.qualified(forked, "x"), "main.x");
    assert_eq!(scopes.qualified2(forked, "missing"), None);
    // Unbound names qualify under the current module.
    assert_eq!(scopes.qualified(forked, "missing"), "lambda-1.missing");
}

#[test]
fn test_scope_child_constructors() {
    let (mut scopes, root) = ScopeTree::new("main");

    let scoped = scopes.scoped(root, "f");
    assert_eq!(scopes.module(scoped), "main.f");
    assert_eq!(scopes.block(scoped), "main.f");

    let forked = scopes.forked(root, "lambda-2");
    assert_eq!(scopes.module(forked), "lambda-2");
    assert_eq!(scopes.block(forked), "lambda-2");

    let unique = scopes.unique(root);
    assert!(scopes.module(unique).starts_with("main.let-"));
    assert_eq!(scopes.block(unique), "main");
}

#[test]
fn test_scope_get_returns_defining_ir() {
    let (mut scopes, root) = ScopeTree::new("main");
    scopes.define(root, "x", dummy_ir());

    let inner = scopes.unique(root);
    assert_eq!(scopes.get(inner, "x"), Some(&dummy_ir()));
    assert!(scopes.get(inner, "y").is_none());
    assert_eq!(scopes.kind(inner), ScopeKind::Unique);
}

#[test]
fn test_scope_shadowing_resolves_to_nearest() {
    let (mut scopes, root) = ScopeTree::new("main");
    scopes.define(root, "x", dummy_ir());
    let inner = scopes.unique(root);
    scopes.define(inner, "x", dummy_ir());

    let qualified = scopes.qualified(inner, "x");
    assert!(qualified.starts_with("main.let-"), "got: {qualified}");
}

// Layout passes

#[test]
fn test_deduped_keeps_first_value() {
    let items = vec![
        Item::Value(ValueKind::Str, "s".to_string(), Operand::Str("first".to_string())),
        Item::Value(ValueKind::Str, "s".to_string(), Operand::Str("second".to_string())),
    ];
    let deduped = output::deduped(items);
    assert_eq!(
        deduped,
        vec![Item::Value(ValueKind::Str, "s".to_string(), Operand::Str("first".to_string()))]
    );
}

#[test]
fn test_layout_orders_main_halt_sections_values() {
    let items = vec![
        Item::Grouped("main".to_string(), Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(1)))),
        Item::Grouped("f".to_string(), Code::Instr(Instr::Ret)),
        Item::Value(ValueKind::Str, "s".to_string(), Operand::Str("x".to_string())),
    ];
    let codes = output::layout(items);
    assert_eq!(
        codes,
        vec![
            Code::Label("main".to_string()),
            Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(1))),
            Code::Instr(Instr::Halt),
            Code::Label("f".to_string()),
            Code::Instr(Instr::Ret),
            Code::Value(ValueKind::Str, "s".to_string(), Operand::Str("x".to_string())),
        ]
    );
}

#[test]
fn test_labeled_does_not_double_header() {
    let items = vec![
        Item::Grouped("f".to_string(), Code::Label("f".to_string())),
        Item::Grouped("f".to_string(), Code::Instr(Instr::Ret)),
    ];
    let codes = output::layout(items);
    let headers = codes.iter().filter(|code| **code == Code::Label("f".to_string())).count();
    assert_eq!(headers, 1);
}

#[test]
fn test_framed_rewrites_placeholders() {
    let items = vec![Item::Grouped(
        "main".to_string(),
        Code::Instr(Instr::FrameInit(2)),
    )];
    let codes = output::layout(items);
    assert!(codes.contains(&Code::Instr(Instr::Frame(2))));
    assert!(!codes.iter().any(|code| matches!(code, Code::Instr(Instr::FrameInit(_)))));
}

// Generated programs

#[test]
fn test_every_label_emitted_once() {
    let codes =
        compile_ok("let f = func () = 1 g = func () = 2 in f() + g()");
    let mut seen = HashSet::new();
    for code in &codes {
        if let Code::Label(name) = code {
            assert!(seen.insert(name.clone()), "label `{name}` emitted twice");
        }
    }
}

#[test]
fn test_constant_pool_dedup_end_to_end() {
    let codes = compile_ok("begin %{abc} %{abc} %{abc} end");
    let labels: Vec<&String> = codes
        .iter()
        .filter_map(|code| match code {
            Code::Value(_, label, _) => Some(label),
            _ => None,
        })
        .collect();
    let unique: HashSet<&&String> = labels.iter().collect();
    assert_eq!(labels.len(), unique.len(), "duplicate pool labels: {labels:?}");

    let abc_entries = codes
        .iter()
        .filter(|code| {
            matches!(code, Code::Value(ValueKind::Str, _, Operand::Str(text)) if text == "abc")
        })
        .count();
    assert_eq!(abc_entries, 1);
}

#[test]
fn test_layout_single_halt_after_main() {
    let codes = compile_ok("begin 1 + 2 end");

    assert_eq!(codes[0], Code::Label("main".to_string()));

    let halts: Vec<usize> = codes
        .iter()
        .enumerate()
        .filter_map(|(index, code)| {
            matches!(code, Code::Instr(Instr::Halt)).then_some(index)
        })
        .collect();
    assert_eq!(halts.len(), 1, "expected exactly one halt");
    let halt = halts[0];

    // Every other section starts after the halt.
    let plus = codes
        .iter()
        .position(|code| *code == Code::Label("main.+".to_string()))
        .expect("the + section should exist");
    assert!(plus > halt);

    // The constant pool is a contiguous tail.
    let first_value = codes
        .iter()
        .position(|code| matches!(code, Code::Value(..)))
        .expect("the pool should not be empty");
    assert!(codes[first_value..].iter().all(|code| matches!(code, Code::Value(..))));
}

#[test]
fn test_call_convention_shape() {
    let codes = compile_bare("test.lv", "def id(x) = x\nid(1)").unwrap();

    let start = codes
        .iter()
        .position(|code| *code == Code::Label("main.id".to_string()))
        .expect("the id section should exist");
    assert!(
        matches!(&codes[start + 1], Code::Label(name) if name.starts_with("lambda-")),
        "the lambda entry label should follow the section header"
    );

    let body: Vec<Code> = codes[start + 2..start + 16].to_vec();
    let slot = "main.id.x".to_string();
    assert_eq!(
        body,
        vec![
            Code::Instr(Instr::Frame(1)),
            Code::Instr(Instr::Swap),
            Code::Instr(Instr::Store(ValueKind::I32, slot.clone())),
            Code::Instr(Instr::Stw(Register::Ebp)),
            Code::Instr(Instr::Stw(Register::Esp)),
            Code::Instr(Instr::Ldw(Register::Ebp)),
            Code::Instr(Instr::Load(ValueKind::I32, slot)),
            Code::Instr(Instr::Ldw(Register::Rt)),
            Code::Instr(Instr::Stw(Register::Ebp)),
            Code::Instr(Instr::Ldw(Register::Esp)),
            Code::Instr(Instr::Ldw(Register::Ebp)),
            Code::Instr(Instr::Stw(Register::Rt)),
            Code::Instr(Instr::Swap),
            Code::Instr(Instr::Ret),
        ]
    );

    // The definition is referenced from the constant pool by its
    // qualified name.
    assert!(codes.contains(&Code::Value(
        ValueKind::Ref,
        "main.id".to_string(),
        Operand::Id("main.id".to_string())
    )));
}

#[test]
fn test_cond_layout() {
    let codes = compile_bare("test.lv", "if true then 1 else 2").unwrap();
    let instrs: Vec<&Code> = codes.iter().collect();

    let jz = instrs
        .iter()
        .position(|code| matches!(code, Code::Instr(Instr::Jz(label)) if label.starts_with("else-")))
        .expect("jz to the else label");
    let jmp = instrs
        .iter()
        .position(|code| matches!(code, Code::Instr(Instr::Jmp(label)) if label.starts_with("done-")))
        .expect("jmp to the done label");
    let then_label = instrs
        .iter()
        .position(|code| matches!(code, Code::Label(name) if name.starts_with("then-")))
        .expect("then label");
    let else_label = instrs
        .iter()
        .position(|code| matches!(code, Code::Label(name) if name.starts_with("else-")))
        .expect("else label");
    let done_label = instrs
        .iter()
        .position(|code| matches!(code, Code::Label(name) if name.starts_with("done-")))
        .expect("done label");

    assert!(jz < then_label && then_label < jmp && jmp < else_label && else_label < done_label);
}

#[test]
fn test_let_code_stays_in_enclosing_section() {
    let codes = compile_bare("test.lv", "let x = 1 in x").unwrap();
    let halt = codes
        .iter()
        .position(|code| matches!(code, Code::Instr(Instr::Halt)))
        .unwrap();

    // Both the binding store and the body load happen in main, before
    // the halt.
    let store = codes
        .iter()
        .position(|code| matches!(code, Code::Instr(Instr::Store(_, slot)) if slot.ends_with(".x")))
        .expect("binding store");
    let load = codes
        .iter()
        .position(|code| matches!(code, Code::Instr(Instr::Load(_, slot)) if slot.ends_with(".x")))
        .expect("body load");
    assert!(store < halt && load < halt);

    // The slot is qualified under a synthesized let module.
    assert!(matches!(
        &codes[store],
        Code::Instr(Instr::Store(_, slot)) if slot.contains(".let-")
    ));
}

#[test]
fn test_lambda_binding_stores_ref() {
    let codes = compile_bare("test.lv", "let f = func () = 1 in f()").unwrap();
    let push = codes.iter().find_map(|code| match code {
        Code::Instr(Instr::Push(ValueKind::Ref, Operand::Id(label))) => Some(label.clone()),
        _ => None,
    });
    let ptr = push.expect("the binding should push the lambda reference");
    assert!(ptr.starts_with("lambda-"));

    assert!(codes.iter().any(|code| {
        matches!(code, Code::Instr(Instr::Store(ValueKind::Ref, slot)) if slot.ends_with(".f"))
    }));
}

// Generator errors

#[test]
fn test_bad_push_for_fractional_literal() {
    let err = generator_err("3.5");
    assert!(matches!(err, GeneratorError::BadPush { ref lexeme, .. } if lexeme == "3.5"));
}

#[test]
fn test_undeclared_identifier() {
    let err = generator_err("missing");
    assert!(
        matches!(err, GeneratorError::UndeclaredIdentifier { ref name, .. } if name == "missing")
    );
}

#[test]
fn test_bad_call_on_literal() {
    let err = generator_err("5(1)");
    assert!(matches!(err, GeneratorError::BadCall { .. }), "got: {err:?}");
}

#[test]
fn test_opcode_requires_string_literal() {
    let err = generator_err("opcode(5)");
    assert!(matches!(err, GeneratorError::OpcodeSyntax { .. }), "got: {err:?}");
}

#[test]
fn test_definition_cannot_be_stored() {
    // The surface grammar cannot place a `def` in value position, so
    // drive the generator with hand-built IR.
    let loc = Loc::new("test.lv", 0);
    let tree = vec![Ir::Let {
        bindings: vec![IrBinding {
            name: "x".to_string(),
            loc: loc.clone(),
            value: Ir::Def {
                name: "y".to_string(),
                value: Box::new(dummy_ir()),
                loc: loc.clone(),
            },
        }],
        body: Box::new(dummy_ir()),
        loc,
    }];

    let err = codegen::generate(&tree).unwrap_err();
    assert!(matches!(err, GeneratorError::CannotStoreDef { .. }), "got: {err:?}");
}

// Embedded assembler

fn asm_ok(source: &str) -> Vec<Code> {
    let (scopes, root) = ScopeTree::new("main");
    asm::assemble(&scopes, root, source, &Loc::new("test.lv", 0)).expect("assembly should succeed")
}

fn asm_err(source: &str) -> GeneratorError {
    let (scopes, root) = ScopeTree::new("main");
    asm::assemble(&scopes, root, source, &Loc::new("test.lv", 0))
        .expect_err("assembly should fail")
}

#[test]
fn test_asm_basic_program() {
    let codes = asm_ok("push I32 #7\nhalt");
    assert_eq!(
        codes,
        vec![
            Code::Instr(Instr::Push(ValueKind::I32, Operand::I32(7))),
            Code::Instr(Instr::Halt),
        ]
    );
}

#[test]
fn test_asm_booleans_and_registers() {
    let codes = asm_ok("push Bool #true\nmov jm #3\nstw ebp\nldw esp");
    assert_eq!(
        codes,
        vec![
            Code::Instr(Instr::Push(ValueKind::Bool, Operand::True)),
            Code::Instr(Instr::Mov(Register::Jm, Some(Operand::I32(3)))),
            Code::Instr(Instr::Stw(Register::Ebp)),
            Code::Instr(Instr::Ldw(Register::Esp)),
        ]
    );
}

#[test]
fn test_asm_local_labels_qualify() {
    let codes = asm_ok("start:\njmp start");
    assert_eq!(
        codes,
        vec![
            Code::Label("main.start".to_string()),
            Code::Instr(Instr::Jmp("main.start".to_string())),
        ]
    );
}

#[test]
fn test_asm_resolves_bindings_through_scope() {
    let (mut scopes, root) = ScopeTree::new("main");
    scopes.define(root, "x", dummy_ir());
    let codes = asm::assemble(&scopes, root, "load I32 x", &Loc::new("test.lv", 0)).unwrap();
    assert_eq!(codes, vec![Code::Instr(Instr::Load(ValueKind::I32, "main.x".to_string()))]);
}

#[test]
fn test_asm_dotted_names_pass_through() {
    let codes = asm_ok("call other.section");
    assert_eq!(codes, vec![Code::Instr(Instr::Call("other.section".to_string()))]);
}

#[test]
fn test_asm_unknown_opcode() {
    let err = asm_err("frobnicate I32");
    assert!(
        matches!(err, GeneratorError::UnknownUserOpcode { ref name, .. } if name == "frobnicate")
    );
}

#[test]
fn test_asm_invalid_i32() {
    let err = asm_err("push I32 #abc");
    assert!(matches!(err, GeneratorError::InvalidI32 { ref lexeme, .. } if lexeme == "abc"));
}

#[test]
fn test_asm_lookup_error() {
    let err = asm_err("load I32 nowhere");
    assert!(matches!(err, GeneratorError::Lookup { ref name, .. } if name == "nowhere"));
}

#[test]
fn test_asm_wrong_operands() {
    let err = asm_err("push I32");
    assert!(matches!(err, GeneratorError::OpcodeSyntax { .. }), "got: {err:?}");
}

#[test]
fn test_asm_line_locations_advance() {
    let err = asm_err("push I32 #1\nbroken");
    let GeneratorError::UnknownUserOpcode { loc, .. } = err else {
        panic!("expected an unknown opcode error");
    };
    // Base offset 0 + `%{` opener (2) + first line and newline (12).
    assert_eq!(loc.offset, 14);
}

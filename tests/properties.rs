//! Property tests over the lowering pipeline
//!
//! These check the backend's quantified invariants: lowering is
//! deterministic, every emitted code block's declared allocation covers
//! exactly the bytes its instructions write, every block hands control
//! somewhere, and constructor tags follow declaration order.

use proptest::prelude::*;

use basalt::codegen::cmm::{
    literal_string_bytes, CmmProgram, CodeBlock, Function, FunctionBody, FunctionName,
    Instruction, WORD,
};
use basalt::codegen::{lower_cmm, lower_stg};
use basalt::infer::infer;
use basalt::simplifier::{simplify, NameSource};
use basalt::types::TypeContext;
use basalt::{Lexer, Parser};

fn compile_to_cmm(source: &str) -> CmmProgram {
    let tokens = Lexer::new(source).tokenize().unwrap();
    let program = Parser::new(tokens).parse_program().unwrap();
    let ctx = TypeContext::from_program(&program).unwrap();
    let mut names = NameSource::new();
    let simplified = simplify(&program, &ctx, &mut names).unwrap();
    let typed = infer(&simplified, ctx).unwrap();
    let stg = lower_stg(&typed, &mut names).unwrap();
    lower_cmm(&stg).unwrap()
}

// ============================================================================
// Generators
// ============================================================================

/// A small arithmetic expression, rendered as source text
#[derive(Debug, Clone)]
enum Arith {
    Lit(i64),
    Add(Box<Arith>, Box<Arith>),
    Sub(Box<Arith>, Box<Arith>),
    Mul(Box<Arith>, Box<Arith>),
}

impl Arith {
    fn render(&self) -> String {
        match self {
            Arith::Lit(n) => format!("{}", n),
            Arith::Add(a, b) => format!("({} + {})", a.render(), b.render()),
            Arith::Sub(a, b) => format!("({} - {})", a.render(), b.render()),
            Arith::Mul(a, b) => format!("({} * {})", a.render(), b.render()),
        }
    }
}

fn arb_arith() -> impl Strategy<Value = Arith> {
    let leaf = (0i64..100).prop_map(Arith::Lit);
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Arith::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone())
                .prop_map(|(a, b)| Arith::Sub(Box::new(a), Box::new(b))),
            (inner.clone(), inner).prop_map(|(a, b)| Arith::Mul(Box::new(a), Box::new(b))),
        ]
    })
}

// ============================================================================
// Allocation accounting (the reservation property)
// ============================================================================

/// Bytes a block's instructions actually write into the heap
fn written_bytes(f: &Function, block: &CodeBlock) -> u64 {
    let mut total = 0;
    for instr in &block.instructions {
        total += match instr {
            Instruction::AllocTable { sub, pointers, ints, strings } => {
                let target = &f.sub_functions[*sub as usize];
                let padded = target.updateable && target.bound.total() == 0;
                WORD * (1
                    + pointers.len() as u64
                    + ints.len() as u64
                    + strings.len() as u64
                    + padded as u64)
            }
            Instruction::AllocInt(_) => 2 * WORD,
            Instruction::AllocString(s) => WORD + literal_string_bytes(s),
            _ => 0,
        };
    }
    total
}

fn blocks_of(f: &Function) -> Vec<&CodeBlock> {
    match &f.body {
        FunctionBody::Normal(b) => vec![b],
        FunctionBody::IntCase { branches, default, .. } => branches
            .iter()
            .map(|(_, b)| b)
            .chain(std::iter::once(default))
            .collect(),
        FunctionBody::TagCase { branches, default, .. } => branches
            .iter()
            .map(|(_, _, b)| b)
            .chain(std::iter::once(default))
            .collect(),
        FunctionBody::StringCase { branches, default, .. } => branches
            .iter()
            .map(|(_, b)| b)
            .chain(std::iter::once(default))
            .collect(),
    }
}

fn check_function_allocations(f: &Function) {
    for block in blocks_of(f) {
        let written = written_bytes(f, block);
        assert!(
            written <= block.allocation.bytes(),
            "allocation under-reserves in {:?}",
            f.name
        );
        assert_eq!(
            written,
            block.allocation.bytes(),
            "allocation tally drifted from writes in {:?}",
            f.name
        );
    }
    for sub in &f.sub_functions {
        check_function_allocations(sub);
    }
}

fn check_function_termination(f: &Function) {
    for block in blocks_of(f) {
        let last = block.instructions.last().expect("blocks are never empty");
        assert!(
            matches!(
                last,
                Instruction::Enter(_) | Instruction::EnterCaseContinuation | Instruction::Exit
            ),
            "block ends without handing control over in {:?}",
            f.name
        );
    }
    for sub in &f.sub_functions {
        check_function_termination(sub);
    }
}

proptest! {
    #[test]
    fn prop_lowering_is_deterministic(expr in arb_arith()) {
        let source = format!("main = printInt {}", expr.render());
        let a = compile_to_cmm(&source);
        let b = compile_to_cmm(&source);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_emitted_c_is_deterministic(expr in arb_arith()) {
        let source = format!("main = printInt {}", expr.render());
        prop_assert_eq!(
            basalt::compile(&source).unwrap(),
            basalt::compile(&source).unwrap()
        );
    }

    #[test]
    fn prop_allocations_cover_writes(expr in arb_arith()) {
        let source = format!("main = printInt {}", expr.render());
        let program = compile_to_cmm(&source);
        for f in &program.functions {
            check_function_allocations(f);
        }
        check_function_allocations(&program.entry);
    }

    #[test]
    fn prop_every_block_hands_control_over(expr in arb_arith()) {
        let source = format!("main = printInt {}", expr.render());
        let program = compile_to_cmm(&source);
        for f in &program.functions {
            check_function_termination(f);
        }
        check_function_termination(&program.entry);
    }
}

// ============================================================================
// Constructor tags
// ============================================================================

fn named<'p>(program: &'p CmmProgram, name: &str) -> &'p Function {
    program
        .functions
        .iter()
        .find(|f| f.name == FunctionName::Named(name.to_string()))
        .unwrap()
}

#[test]
fn test_tags_follow_declaration_order() {
    let program = compile_to_cmm(
        "data T = A | B Int | C Int Int; a = A; b = B 1; c = C 1 2; main = printInt 0",
    );

    let tag_of = |name: &str| {
        let FunctionBody::Normal(block) = &named(&program, name).body else {
            panic!("expected normal body");
        };
        block
            .instructions
            .iter()
            .find_map(|i| match i {
                Instruction::StoreTag(t) => Some(*t),
                _ => None,
            })
            .expect("constructor body stores a tag")
    };

    assert_eq!(tag_of("a"), 0);
    assert_eq!(tag_of("b"), 1);
    assert_eq!(tag_of("c"), 2);
}

#[test]
fn test_constructor_arg_count_matches_arity() {
    let program = compile_to_cmm("data T = A | B Int Int; b = B 1 2; main = printInt 0");
    let FunctionBody::Normal(block) = &named(&program, "b").body else {
        panic!("expected normal body");
    };
    assert!(block
        .instructions
        .iter()
        .any(|i| matches!(i, Instruction::StoreConstructorArgCount(2))));
}

// ============================================================================
// Compile-time halves of the runtime properties
// ============================================================================

#[test]
fn test_multi_argument_functions_get_saturation_checks() {
    // Every function of arity n checks for n arguments at entry, which
    // is what makes partial application work
    let c = basalt::compile("add x y = x + y; inc = add 1; main = printInt (inc 41)").unwrap();
    assert!(c.contains("check_application_update(2, "));
    assert!(c.contains("CodeLabel check_application_update(int64_t arg_count"));
}

#[test]
fn test_thunks_push_typed_update_frames() {
    // Thunk entries push frames whose update code matches the kind of
    // value the thunk reduces to
    let c = basalt::compile(r#"main = printString ("a" ++ "b")"#).unwrap();
    assert!(c.contains("&update_string"));

    let c = basalt::compile("main = printInt (1 + 2 * 3)").unwrap();
    assert!(c.contains("&update_int"));

    let c = basalt::compile(
        "data L = N | C Int L; second xs = case xs of { N -> 0; C x r -> sum r }; \
         sum xs = case xs of { N -> 0; C x r -> x }; \
         main = printInt (second (C 1 (C 2 N)))",
    )
    .unwrap();
    assert!(c.contains("&update_constructor"));
}

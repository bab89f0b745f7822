//! Cmm: the flat, imperative instruction form
//!
//! Each STG lambda form becomes a function whose body is a list of
//! instructions plus an allocation tally, emitted as a single heap
//! reservation at function entry. Case expressions split in two: the
//! outer function buries live variables, pushes the continuation, and
//! evaluates the scrutinee; an "alternatives" sub-function dispatches on
//! the returned value.
//!
//! Arguments are passed on the A-stack with the first argument on top,
//! so a partial application can replay its saved segment by appending
//! it. Constructor fields return the same way.

use std::collections::HashMap;

use crate::ast::{Builtin, Literal};
use crate::codegen::stg::{
    Atom, LambdaForm, StgAlts, StgBinding, StgDefault, StgExpr, StgProgram, Storage, Tag,
    Updateable, ValueKind,
};
use crate::codegen::CompileError;

/// How a Cmm function is identified
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionName {
    /// A named top-level or let binding
    Named(String),
    /// The alternatives sub-function of an enclosing case
    CaseAlts,
    /// The program entry
    Entry,
}

/// How a variable is addressed at a use site
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// nth pointer argument on the A-stack
    Arg(u32),
    /// nth bound pointer in the current closure
    Bound(u32),
    /// nth bound int in the current closure
    BoundInt(u32),
    /// nth bound string in the current closure
    BoundString(u32),
    /// nth global function
    Global(u64),
    /// nth freshly allocated closure in the current body
    Allocated(u32),
    /// nth buried pointer
    Buried(u32),
    /// nth buried int
    BuriedInt(u32),
    /// nth buried string
    BuriedString(u32),
    /// The integer return register, for named primitive defaults
    IntRegister,
    /// The string return register, for named primitive defaults
    StringRegister,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntValue {
    Literal(i64),
    At(Location),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StringValue {
    /// A static string-literal closure
    Literal(String),
    At(Location),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinArg {
    Int(IntValue),
    Str(StringValue),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// IntRegister := value
    StoreInt(IntValue),
    /// StringRegister := value
    StoreString(StringValue),
    /// TagRegister := tag
    StoreTag(Tag),
    /// ConstructorArgCountRegister := count
    StoreConstructorArgCount(u32),
    /// Enter the closure at a location
    Enter(Location),
    /// Pop the continuation from the B-stack and jump to it
    EnterCaseContinuation,
    /// Print a runtime diagnostic to stderr
    PrintError(String),
    /// Terminate with a failure status
    Exit,
    Builtin1(Builtin, BuiltinArg),
    Builtin2(Builtin, BuiltinArg, BuiltinArg),
    /// Push a pointer onto the A-stack
    SAPush(Location),
    /// Push the code label of an alternatives sub-function
    PushCaseContinuation(u32),
    /// Copy a pointer under the continuation for the collector
    Bury(Location),
    BuryInt(IntValue),
    BuryString(StringValue),
    /// Allocate a closure for a sub-function, capturing the listed
    /// values in field order
    AllocTable {
        sub: u32,
        pointers: Vec<Location>,
        ints: Vec<IntValue>,
        strings: Vec<StringValue>,
    },
    /// Allocate a boxed integer closure
    AllocInt(IntValue),
    /// Allocate a string closure holding a literal
    AllocString(String),
}

/// Heap words and bytes a body writes, summed for its entry reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Allocation {
    pub tables: u32,
    pub pointers: u32,
    pub ints: u32,
    pub strings: u32,
    pub literal_bytes: u64,
}

pub const WORD: u64 = 8;

impl Allocation {
    pub fn bytes(&self) -> u64 {
        WORD * (self.tables + self.pointers + self.ints + self.strings) as u64
            + self.literal_bytes
    }
}

/// Bytes a string closure needs for a literal: the bytes and NUL, padded
/// so a forwarding pointer fits during collection
pub fn literal_string_bytes(s: &str) -> u64 {
    (s.len() as u64 + 1).max(WORD)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeBlock {
    pub instructions: Vec<Instruction>,
    pub allocation: Allocation,
}

/// Buried counts by kind, recorded on an alternatives function so it can
/// restore them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArgInfo {
    pub ptrs: u32,
    pub ints: u32,
    pub strings: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Normal(CodeBlock),
    /// Dispatch on IntRegister
    IntCase {
        branches: Vec<(i64, CodeBlock)>,
        default: CodeBlock,
        buried: ArgInfo,
    },
    /// Dispatch on TagRegister; each branch knows its field count
    TagCase {
        branches: Vec<(Tag, u32, CodeBlock)>,
        default: CodeBlock,
        buried: ArgInfo,
    },
    /// Dispatch on the string in StringRegister
    StringCase {
        branches: Vec<(String, CodeBlock)>,
        default: CodeBlock,
        buried: ArgInfo,
    },
}

/// Captured-variable counts by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundArgs {
    pub ptrs: u32,
    pub ints: u32,
    pub strings: u32,
}

impl BoundArgs {
    pub fn total(&self) -> u32 {
        self.ptrs + self.ints + self.strings
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: FunctionName,
    pub global_index: Option<u64>,
    pub arg_count: u32,
    pub bound: BoundArgs,
    /// Entry pushes an update frame when set
    pub updateable: bool,
    /// The kind of value the body returns; selects the update code
    pub ret: ValueKind,
    pub body: FunctionBody,
    pub sub_functions: Vec<Function>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmmProgram {
    pub functions: Vec<Function>,
    pub entry: Function,
}

// ============================================================================
// Lowering
// ============================================================================

type Scope = HashMap<String, (Storage, Location)>;

/// Lower an annotated STG program to Cmm
pub fn lower_cmm(stg: &StgProgram) -> Result<CmmProgram, CompileError> {
    let globals = stg.global_indices();

    let mut functions = Vec::with_capacity(stg.bindings.len());
    for binding in &stg.bindings {
        let index = globals[&binding.name];
        functions.push(lower_function(
            FunctionName::Named(binding.name.clone()),
            Some(index),
            &binding.lf,
            &globals,
        )?);
    }
    let entry = lower_function(FunctionName::Entry, Some(0), &stg.entry, &globals)?;

    Ok(CmmProgram { functions, entry })
}

fn lower_function(
    name: FunctionName,
    global_index: Option<u64>,
    lf: &LambdaForm,
    globals: &HashMap<String, u64>,
) -> Result<Function, CompileError> {
    let mut scope = Scope::new();
    for (i, param) in lf.params.iter().enumerate() {
        scope.insert(
            param.clone(),
            (Storage::Pointer, Location::Arg(i as u32)),
        );
    }

    let mut bound = BoundArgs::default();
    for (free_name, kind) in &lf.free {
        let entry = match kind {
            ValueKind::Pointer => {
                let loc = Location::Bound(bound.ptrs);
                bound.ptrs += 1;
                (Storage::Pointer, loc)
            }
            ValueKind::Int => {
                let loc = Location::BoundInt(bound.ints);
                bound.ints += 1;
                (Storage::Int, loc)
            }
            ValueKind::Str => {
                let loc = Location::BoundString(bound.strings);
                bound.strings += 1;
                (Storage::Str, loc)
            }
        };
        scope.insert(free_name.clone(), entry);
    }

    // Static closures never receive updates
    let updateable = lf.updateable == Updateable::U && global_index.is_none();

    let mut lowerer = FunctionLowerer { globals };
    let mut subs = Vec::new();
    let mut block = CodeBlock::default();
    lowerer.lower_expr(&lf.body, &scope, &mut block, &mut subs)?;

    Ok(Function {
        name,
        global_index,
        arg_count: lf.params.len() as u32,
        bound,
        updateable,
        ret: lf.ret,
        body: FunctionBody::Normal(block),
        sub_functions: subs,
    })
}

struct FunctionLowerer<'a> {
    globals: &'a HashMap<String, u64>,
}

impl<'a> FunctionLowerer<'a> {
    fn resolve(&self, name: &str, scope: &Scope) -> Result<(Storage, Location), CompileError> {
        if let Some(entry) = scope.get(name) {
            return Ok(*entry);
        }
        if let Some(&index) = self.globals.get(name) {
            return Ok((Storage::Global(index), Location::Global(index)));
        }
        Err(CompileError::UnknownName(name.to_string()))
    }

    fn lower_expr(
        &mut self,
        expr: &StgExpr,
        scope: &Scope,
        block: &mut CodeBlock,
        subs: &mut Vec<Function>,
    ) -> Result<(), CompileError> {
        match expr {
            StgExpr::Lit(Literal::Int(n)) => {
                block.instructions.push(Instruction::StoreInt(IntValue::Literal(*n)));
                block.instructions.push(Instruction::EnterCaseContinuation);
            }
            StgExpr::Lit(Literal::Str(s)) => {
                block
                    .instructions
                    .push(Instruction::StoreString(StringValue::Literal(s.clone())));
                block.instructions.push(Instruction::EnterCaseContinuation);
            }
            StgExpr::Lit(Literal::Bool(b)) => {
                block.instructions.push(Instruction::StoreTag(*b as Tag));
                block
                    .instructions
                    .push(Instruction::StoreConstructorArgCount(0));
                block.instructions.push(Instruction::EnterCaseContinuation);
            }
            StgExpr::Error(msg) => {
                block
                    .instructions
                    .push(Instruction::PrintError(msg.clone()));
                block.instructions.push(Instruction::Exit);
            }
            StgExpr::Apply(f, atoms) => {
                let (storage, loc) = self.resolve(f, scope)?;
                // A bare evaluated primitive is a return, not a call
                if atoms.is_empty() {
                    match storage {
                        Storage::Int => {
                            block
                                .instructions
                                .push(Instruction::StoreInt(IntValue::At(loc)));
                            block.instructions.push(Instruction::EnterCaseContinuation);
                            return Ok(());
                        }
                        Storage::Str => {
                            block
                                .instructions
                                .push(Instruction::StoreString(StringValue::At(loc)));
                            block.instructions.push(Instruction::EnterCaseContinuation);
                            return Ok(());
                        }
                        _ => {}
                    }
                } else if matches!(storage, Storage::Int | Storage::Str) {
                    return Err(CompileError::NotPrimitive(f.clone()));
                }
                // First argument ends up on top
                for atom in atoms.iter().rev() {
                    self.push_atom(atom, scope, block)?;
                }
                block.instructions.push(Instruction::Enter(loc));
            }
            StgExpr::Constructor(tag, atoms) => {
                for atom in atoms.iter().rev() {
                    self.push_atom(atom, scope, block)?;
                }
                block.instructions.push(Instruction::StoreTag(*tag));
                block
                    .instructions
                    .push(Instruction::StoreConstructorArgCount(atoms.len() as u32));
                block.instructions.push(Instruction::EnterCaseContinuation);
            }
            StgExpr::Builtin(op, atoms) => {
                let mut args = Vec::with_capacity(atoms.len());
                for (atom, kind) in atoms.iter().zip(builtin_param_kinds(*op)) {
                    args.push(self.builtin_arg(atom, kind, scope)?);
                }
                let instr = match args.len() {
                    1 => Instruction::Builtin1(*op, args.remove(0)),
                    2 => {
                        let b = args.pop().expect("two arguments");
                        let a = args.pop().expect("two arguments");
                        Instruction::Builtin2(*op, a, b)
                    }
                    n => return Err(CompileError::UnsaturatedBuiltin(*op, n)),
                };
                block.instructions.push(instr);
                block.instructions.push(Instruction::EnterCaseContinuation);
            }
            StgExpr::Let(bindings, body) => {
                self.lower_let(bindings, body, scope, block, subs)?;
            }
            StgExpr::Case(scrutinee, alts) => {
                self.lower_case(scrutinee, alts, scope, block, subs)?;
            }
        }
        Ok(())
    }

    fn push_atom(
        &mut self,
        atom: &Atom,
        scope: &Scope,
        block: &mut CodeBlock,
    ) -> Result<(), CompileError> {
        match atom {
            Atom::Lit(Literal::Int(n)) => {
                let idx = alloc_index(block);
                block
                    .instructions
                    .push(Instruction::AllocInt(IntValue::Literal(*n)));
                block.allocation.tables += 1;
                block.allocation.ints += 1;
                block
                    .instructions
                    .push(Instruction::SAPush(Location::Allocated(idx)));
            }
            Atom::Lit(Literal::Str(s)) => {
                let idx = alloc_index(block);
                block.instructions.push(Instruction::AllocString(s.clone()));
                block.allocation.tables += 1;
                block.allocation.literal_bytes += literal_string_bytes(s);
                block
                    .instructions
                    .push(Instruction::SAPush(Location::Allocated(idx)));
            }
            Atom::Lit(Literal::Bool(_)) => {
                // STG lowering boxes boolean literals into closures
                return Err(CompileError::LiteralInFunctionPosition);
            }
            Atom::Name(n) => {
                let (storage, loc) = self.resolve(n, scope)?;
                match storage {
                    Storage::Int => {
                        let idx = alloc_index(block);
                        block
                            .instructions
                            .push(Instruction::AllocInt(IntValue::At(loc)));
                        block.allocation.tables += 1;
                        block.allocation.ints += 1;
                        block
                            .instructions
                            .push(Instruction::SAPush(Location::Allocated(idx)));
                    }
                    // Strings are closures already; push them directly
                    _ => block.instructions.push(Instruction::SAPush(loc)),
                }
            }
        }
        Ok(())
    }

    fn builtin_arg(
        &mut self,
        atom: &Atom,
        kind: ValueKind,
        scope: &Scope,
    ) -> Result<BuiltinArg, CompileError> {
        match (atom, kind) {
            (Atom::Lit(Literal::Int(n)), ValueKind::Int) => {
                Ok(BuiltinArg::Int(IntValue::Literal(*n)))
            }
            (Atom::Lit(Literal::Str(s)), ValueKind::Str) => {
                Ok(BuiltinArg::Str(StringValue::Literal(s.clone())))
            }
            (Atom::Name(n), ValueKind::Int) => {
                let (storage, loc) = self.resolve(n, scope)?;
                if storage != Storage::Int {
                    return Err(CompileError::NotPrimitive(n.clone()));
                }
                Ok(BuiltinArg::Int(IntValue::At(loc)))
            }
            (Atom::Name(n), ValueKind::Str) => {
                let (storage, loc) = self.resolve(n, scope)?;
                if storage != Storage::Str {
                    return Err(CompileError::NotPrimitive(n.clone()));
                }
                Ok(BuiltinArg::Str(StringValue::At(loc)))
            }
            (atom, _) => Err(CompileError::NotPrimitive(format!("{:?}", atom))),
        }
    }

    fn lower_let(
        &mut self,
        bindings: &[StgBinding],
        body: &StgExpr,
        scope: &Scope,
        block: &mut CodeBlock,
        subs: &mut Vec<Function>,
    ) -> Result<(), CompileError> {
        // Allocation addresses are static offsets from the reservation,
        // so sibling closures can reference each other before every
        // field is written
        let first_index = next_alloc_index(block);
        let mut inner = scope.clone();
        for (i, binding) in bindings.iter().enumerate() {
            inner.insert(
                binding.name.clone(),
                (Storage::Pointer, Location::Allocated(first_index + i as u32)),
            );
        }

        for binding in bindings {
            let sub = lower_function(
                FunctionName::Named(binding.name.clone()),
                None,
                &binding.lf,
                self.globals,
            )?;

            let mut pointers = Vec::new();
            let mut ints = Vec::new();
            let mut strings = Vec::new();
            for (free_name, kind) in &binding.lf.free {
                let (_, loc) = self.resolve(free_name, &inner)?;
                match kind {
                    ValueKind::Pointer => pointers.push(loc),
                    ValueKind::Int => ints.push(IntValue::At(loc)),
                    ValueKind::Str => strings.push(StringValue::At(loc)),
                }
            }

            block.allocation.tables += 1;
            block.allocation.pointers += pointers.len() as u32;
            block.allocation.ints += ints.len() as u32;
            block.allocation.strings += strings.len() as u32;
            if sub.updateable && binding.lf.free.is_empty() {
                // Room for the value or indirection written on update
                block.allocation.pointers += 1;
            }

            subs.push(sub);
            block.instructions.push(Instruction::AllocTable {
                sub: subs.len() as u32 - 1,
                pointers,
                ints,
                strings,
            });
        }

        self.lower_expr(body, &inner, block, subs)
    }

    fn lower_case(
        &mut self,
        scrutinee: &StgExpr,
        alts: &StgAlts,
        scope: &Scope,
        block: &mut CodeBlock,
        subs: &mut Vec<Function>,
    ) -> Result<(), CompileError> {
        // Everything the alternatives need must survive the scrutinee,
        // so it is buried under the continuation
        let mut uses = Vec::new();
        alt_uses(alts, &mut Vec::new(), &mut uses);

        let mut ptrs = Vec::new();
        let mut ints = Vec::new();
        let mut strs = Vec::new();
        for name in uses {
            let Some((storage, loc)) = scope.get(&name).copied() else {
                // Globals resolve directly inside the alternatives
                continue;
            };
            match storage {
                Storage::Pointer => ptrs.push((name, loc)),
                Storage::Int => ints.push((name, loc)),
                Storage::Str => strs.push((name, loc)),
                Storage::Global(_) => {}
            }
        }

        let buried = ArgInfo {
            ptrs: ptrs.len() as u32,
            ints: ints.len() as u32,
            strings: strs.len() as u32,
        };

        // The alternatives see only buried copies and the registers
        let mut alt_scope = Scope::new();
        for (i, (name, _)) in ptrs.iter().enumerate() {
            alt_scope.insert(name.clone(), (Storage::Pointer, Location::Buried(i as u32)));
        }
        for (i, (name, _)) in ints.iter().enumerate() {
            alt_scope.insert(name.clone(), (Storage::Int, Location::BuriedInt(i as u32)));
        }
        for (i, (name, _)) in strs.iter().enumerate() {
            alt_scope.insert(
                name.clone(),
                (Storage::Str, Location::BuriedString(i as u32)),
            );
        }

        let alts_function = self.lower_alts(alts, &alt_scope, buried)?;
        subs.push(alts_function);
        let sub_index = subs.len() as u32 - 1;

        // Pointer and string burials go under the arguments on the
        // A-stack where the collector can see them; ints ride the
        // B-stack under the continuation
        for (_, loc) in &ptrs {
            block.instructions.push(Instruction::Bury(*loc));
        }
        for (_, loc) in &strs {
            block.instructions.push(Instruction::BuryString(StringValue::At(*loc)));
        }
        for (_, loc) in &ints {
            block.instructions.push(Instruction::BuryInt(IntValue::At(*loc)));
        }
        block
            .instructions
            .push(Instruction::PushCaseContinuation(sub_index));

        self.lower_expr(scrutinee, scope, block, subs)
    }

    fn lower_alts(
        &mut self,
        alts: &StgAlts,
        alt_scope: &Scope,
        buried: ArgInfo,
    ) -> Result<Function, CompileError> {
        let mut subs = Vec::new();

        let mut lower_block = |this: &mut Self,
                               expr: &StgExpr,
                               scope: &Scope,
                               subs: &mut Vec<Function>|
         -> Result<CodeBlock, CompileError> {
            let mut block = CodeBlock::default();
            this.lower_expr(expr, scope, &mut block, subs)?;
            Ok(block)
        };

        let body = match alts {
            StgAlts::Int(branches, default) => {
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    out.push((*lit, lower_block(self, body, alt_scope, &mut subs)?));
                }
                let default = self.lower_default(
                    default,
                    alt_scope,
                    Some((Storage::Int, Location::IntRegister)),
                    &mut subs,
                )?;
                FunctionBody::IntCase {
                    branches: out,
                    default,
                    buried,
                }
            }
            StgAlts::Bool(branches, default) => {
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    out.push((
                        *lit as Tag,
                        0,
                        lower_block(self, body, alt_scope, &mut subs)?,
                    ));
                }
                let default = self.lower_default(default, alt_scope, None, &mut subs)?;
                FunctionBody::TagCase {
                    branches: out,
                    default,
                    buried,
                }
            }
            StgAlts::Str(branches, default) => {
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    out.push((lit.clone(), lower_block(self, body, alt_scope, &mut subs)?));
                }
                let default = self.lower_default(
                    default,
                    alt_scope,
                    Some((Storage::Str, Location::StringRegister)),
                    &mut subs,
                )?;
                FunctionBody::StringCase {
                    branches: out,
                    default,
                    buried,
                }
            }
            StgAlts::Constructor(branches, default) => {
                let mut out = Vec::with_capacity(branches.len());
                for (tag, binders, body) in branches {
                    // Fields arrive on the A-stack like arguments
                    let mut scope = alt_scope.clone();
                    for (i, binder) in binders.iter().enumerate() {
                        scope.insert(
                            binder.clone(),
                            (Storage::Pointer, Location::Arg(i as u32)),
                        );
                    }
                    out.push((
                        *tag,
                        binders.len() as u32,
                        lower_block(self, body, &scope, &mut subs)?,
                    ));
                }
                if default.binder.is_some() {
                    return Err(CompileError::BoundConstructorDefault);
                }
                let default = self.lower_default(default, alt_scope, None, &mut subs)?;
                FunctionBody::TagCase {
                    branches: out,
                    default,
                    buried,
                }
            }
        };

        Ok(Function {
            name: FunctionName::CaseAlts,
            global_index: None,
            arg_count: 0,
            bound: BoundArgs::default(),
            updateable: false,
            ret: ValueKind::Pointer,
            body,
            sub_functions: subs,
        })
    }

    fn lower_default(
        &mut self,
        default: &StgDefault,
        alt_scope: &Scope,
        binding: Option<(Storage, Location)>,
        subs: &mut Vec<Function>,
    ) -> Result<CodeBlock, CompileError> {
        let mut scope = alt_scope.clone();
        if let (Some(binder), Some(entry)) = (&default.binder, binding) {
            scope.insert(binder.clone(), entry);
        }
        let mut block = CodeBlock::default();
        self.lower_expr(&default.body, &scope, &mut block, subs)?;
        Ok(block)
    }
}

/// Index the next allocation instruction will receive
fn next_alloc_index(block: &CodeBlock) -> u32 {
    block
        .instructions
        .iter()
        .filter(|i| {
            matches!(
                i,
                Instruction::AllocTable { .. }
                    | Instruction::AllocInt(_)
                    | Instruction::AllocString(_)
            )
        })
        .count() as u32
}

fn alloc_index(block: &CodeBlock) -> u32 {
    next_alloc_index(block)
}

fn builtin_param_kinds(op: Builtin) -> Vec<ValueKind> {
    use Builtin::*;
    match op {
        Add | Sub | Mul | Div | Less | LessEqual | Greater | GreaterEqual | EqualTo
        | NotEqualTo => vec![ValueKind::Int, ValueKind::Int],
        Concat => vec![ValueKind::Str, ValueKind::Str],
        PrintInt | Negate => vec![ValueKind::Int],
        PrintString => vec![ValueKind::Str],
    }
}

/// Names an alternative set uses, in first-use order, excluding names it
/// binds itself. Nested lambda forms contribute their free lists.
fn alt_uses(alts: &StgAlts, bound: &mut Vec<String>, out: &mut Vec<String>) {
    match alts {
        StgAlts::Int(branches, d) => {
            for (_, body) in branches {
                expr_uses(body, bound, out);
            }
            default_uses(d, bound, out);
        }
        StgAlts::Bool(branches, d) => {
            for (_, body) in branches {
                expr_uses(body, bound, out);
            }
            default_uses(d, bound, out);
        }
        StgAlts::Str(branches, d) => {
            for (_, body) in branches {
                expr_uses(body, bound, out);
            }
            default_uses(d, bound, out);
        }
        StgAlts::Constructor(branches, d) => {
            for (_, binders, body) in branches {
                let depth = bound.len();
                bound.extend(binders.iter().cloned());
                expr_uses(body, bound, out);
                bound.truncate(depth);
            }
            default_uses(d, bound, out);
        }
    }
}

fn default_uses(d: &StgDefault, bound: &mut Vec<String>, out: &mut Vec<String>) {
    let depth = bound.len();
    if let Some(binder) = &d.binder {
        bound.push(binder.clone());
    }
    expr_uses(&d.body, bound, out);
    bound.truncate(depth);
}

fn add_name(name: &str, bound: &[String], out: &mut Vec<String>) {
    if bound.iter().any(|b| b == name) {
        return;
    }
    if !out.iter().any(|o| o == name) {
        out.push(name.to_string());
    }
}

fn expr_uses(expr: &StgExpr, bound: &mut Vec<String>, out: &mut Vec<String>) {
    match expr {
        StgExpr::Lit(_) | StgExpr::Error(_) => {}
        StgExpr::Apply(f, atoms) => {
            add_name(f, bound, out);
            for atom in atoms {
                if let Atom::Name(n) = atom {
                    add_name(n, bound, out);
                }
            }
        }
        StgExpr::Constructor(_, atoms) | StgExpr::Builtin(_, atoms) => {
            for atom in atoms {
                if let Atom::Name(n) = atom {
                    add_name(n, bound, out);
                }
            }
        }
        StgExpr::Let(bindings, body) => {
            let depth = bound.len();
            bound.extend(bindings.iter().map(|b| b.name.clone()));
            for b in bindings {
                // Free lists were filled by the annotation pass
                for (name, _) in &b.lf.free {
                    add_name(name, bound, out);
                }
            }
            expr_uses(body, bound, out);
            bound.truncate(depth);
        }
        StgExpr::Case(scrutinee, alts) => {
            expr_uses(scrutinee, bound, out);
            alt_uses(alts, bound, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::stg::lower_stg;
    use crate::infer::infer;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::simplifier::{simplify, NameSource};
    use crate::types::TypeContext;

    fn lower_source(input: &str) -> CmmProgram {
        let tokens = Lexer::new(input).tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        let ctx = TypeContext::from_program(&program).unwrap();
        let mut names = NameSource::new();
        let simplified = simplify(&program, &ctx, &mut names).unwrap();
        let typed = infer(&simplified, ctx).unwrap();
        let stg = lower_stg(&typed, &mut names).unwrap();
        lower_cmm(&stg).unwrap()
    }

    fn function<'p>(program: &'p CmmProgram, name: &str) -> &'p Function {
        program
            .functions
            .iter()
            .find(|f| f.name == FunctionName::Named(name.to_string()))
            .unwrap()
    }

    fn block(f: &Function) -> &CodeBlock {
        match &f.body {
            FunctionBody::Normal(b) => b,
            other => panic!("expected normal body, got {:?}", other),
        }
    }

    #[test]
    fn test_entry_enters_main() {
        let program = lower_source("main = printInt 42");
        assert_eq!(program.entry.global_index, Some(0));
        let b = block(&program.entry);
        let main_index = function(&program, "main").global_index.unwrap();
        assert_eq!(
            b.instructions,
            vec![Instruction::Enter(Location::Global(main_index))]
        );
    }

    #[test]
    fn test_print_literal() {
        let program = lower_source("main = printInt 42");
        let main = function(&program, "main");
        assert!(!main.updateable);
        let b = block(main);
        assert_eq!(
            b.instructions,
            vec![
                Instruction::Builtin1(
                    crate::ast::Builtin::PrintInt,
                    BuiltinArg::Int(IntValue::Literal(42))
                ),
                Instruction::EnterCaseContinuation,
            ]
        );
        assert_eq!(b.allocation, Allocation::default());
    }

    #[test]
    fn test_apply_pushes_first_arg_last() {
        // f is applied to a boxed literal: alloc, push, enter
        let program = lower_source("f x = x; main = printInt 0; other = f 3");
        let other = function(&program, "other");
        let f_index = function(&program, "f").global_index.unwrap();
        let b = block(other);
        assert_eq!(
            b.instructions,
            vec![
                Instruction::AllocInt(IntValue::Literal(3)),
                Instruction::SAPush(Location::Allocated(0)),
                Instruction::Enter(Location::Global(f_index)),
            ]
        );
        assert_eq!(b.allocation.tables, 1);
        assert_eq!(b.allocation.ints, 1);
    }

    #[test]
    fn test_case_splits_into_subfunction() {
        let program = lower_source(
            "data L = N | C Int L; sum N = 0; sum (C x xs) = 1; main = printInt (sum N)",
        );
        let sum = function(&program, "sum");
        let b = block(sum);
        // Bury nothing, push the continuation, enter the scrutinee
        assert_eq!(
            b.instructions,
            vec![
                Instruction::PushCaseContinuation(0),
                Instruction::Enter(Location::Arg(0)),
            ]
        );
        assert_eq!(sum.sub_functions.len(), 1);
        let alts = &sum.sub_functions[0];
        assert_eq!(alts.name, FunctionName::CaseAlts);
        match &alts.body {
            FunctionBody::TagCase { branches, default, .. } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(branches[0].0, 0);
                assert_eq!(branches[0].1, 0);
                assert_eq!(branches[1].0, 1);
                assert_eq!(branches[1].1, 2);
                // Exhaustive matches still carry a failing default
                assert!(matches!(
                    default.instructions[0],
                    Instruction::PrintError(_)
                ));
            }
            other => panic!("expected tag case, got {:?}", other),
        }
    }

    #[test]
    fn test_live_values_buried_across_cases() {
        // In `x + sum xs`, the thunk for `sum xs` survives the forcing
        // of x, and x's value survives the forcing of the thunk
        let program = lower_source(
            "data L = N | C Int L; sum N = 0; sum (C x xs) = x + sum xs; \
             main = printInt (sum N)",
        );
        let sum = function(&program, "sum");
        let alts = &sum.sub_functions[0];
        let cons_branch = match &alts.body {
            FunctionBody::TagCase { branches, .. } => &branches[1].2,
            other => panic!("expected tag case, got {:?}", other),
        };
        // The recursive-call thunk is allocated, then buried while x is
        // forced
        assert!(matches!(
            cons_branch.instructions[0],
            Instruction::AllocTable { .. }
        ));
        assert!(cons_branch
            .instructions
            .iter()
            .any(|i| matches!(i, Instruction::Bury(Location::Allocated(0)))));

        // Forcing x: the continuation holds the thunk as a buried pointer
        let force_x = &alts.sub_functions[0];
        match &force_x.body {
            FunctionBody::IntCase { buried, .. } => assert_eq!(buried.ptrs, 1),
            other => panic!("expected int case, got {:?}", other),
        }
        // Forcing the thunk: x's value rides the B-stack
        let force_thunk = &force_x.sub_functions[0];
        match &force_thunk.body {
            FunctionBody::IntCase { buried, .. } => assert_eq!(buried.ints, 1),
            other => panic!("expected int case, got {:?}", other),
        }
    }

    #[test]
    fn test_let_allocates_closures() {
        let program = lower_source("f x = let g y = y + x in g x; main = printInt (f 1)");
        let f = function(&program, "f");
        let b = block(f);
        match &b.instructions[0] {
            Instruction::AllocTable { sub, pointers, .. } => {
                assert_eq!(*sub, 0);
                // g captures x
                assert_eq!(pointers, &vec![Location::Arg(0)]);
            }
            other => panic!("expected alloc table, got {:?}", other),
        }
        assert_eq!(b.allocation.tables, 1);
        assert_eq!(b.allocation.pointers, 1);
        assert_eq!(f.sub_functions[0].arg_count, 1);
        assert_eq!(f.sub_functions[0].bound.ptrs, 1);
    }

    #[test]
    fn test_zero_capture_thunk_padded_for_update() {
        let program = lower_source("main = printInt (1 + 2 * 3)");
        let main = function(&program, "main");
        let b = block(main);
        // The product thunk captures nothing; its closure still reserves
        // a word for the update
        let thunk_allocs: Vec<_> = b
            .instructions
            .iter()
            .filter(|i| matches!(i, Instruction::AllocTable { .. }))
            .collect();
        assert_eq!(thunk_allocs.len(), 1);
        assert_eq!(b.allocation.tables, 1);
        assert_eq!(b.allocation.pointers, 1);
        assert!(main.sub_functions[0].updateable);
        assert_eq!(main.sub_functions[0].ret, ValueKind::Int);
    }

    #[test]
    fn test_string_concat_operands() {
        let program = lower_source(r#"main = printString ("a" ++ "b")"#);
        let main = function(&program, "main");
        // The concat lives in a thunk; find its builtin
        let thunk = &main.sub_functions[0];
        let b = block(thunk);
        assert!(b.instructions.iter().any(|i| matches!(
            i,
            Instruction::Builtin2(
                crate::ast::Builtin::Concat,
                BuiltinArg::Str(StringValue::Literal(_)),
                BuiltinArg::Str(StringValue::Literal(_))
            )
        )));
    }

    #[test]
    fn test_allocation_bytes() {
        let a = Allocation {
            tables: 2,
            pointers: 1,
            ints: 1,
            strings: 0,
            literal_bytes: 8,
        };
        assert_eq!(a.bytes(), 8 * 4 + 8);
    }

    #[test]
    fn test_global_thunk_not_updateable() {
        let program = lower_source("two = 1 + 1; main = printInt two");
        let two = function(&program, "two");
        assert!(!two.updateable);
        assert_eq!(two.ret, ValueKind::Int);
    }
}

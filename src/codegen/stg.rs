//! STG intermediate representation and its lowering
//!
//! Expressions are atomized: arguments to applications, constructors and
//! builtins are literals or names, with anything larger bound through a
//! let. Each binding is a lambda form carrying its free variables in a
//! stable order (pointers, then ints, then strings), an updateable flag,
//! and its parameter list.
//!
//! Builtin arguments that are not yet evaluated are forced through
//! wrapping cases here, so the Cmm layer only ever sees primitive
//! operands that are literals or evaluated bindings.

use std::collections::{HashMap, HashSet};

use crate::ast::{Builtin, Literal};
use crate::codegen::CompileError;
use crate::simplifier::NameSource;
use crate::tast::{TCaseAlts, TCaseDefault, TDef, TExpr, TExprKind, TypedProgram};
use crate::types::Type;

pub type Tag = u64;

/// The runtime kind of a value: how it is stored and returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// A closure pointer (boxed or polymorphic)
    Pointer,
    /// An evaluated 64-bit integer
    Int,
    /// An evaluated string-closure pointer
    Str,
}

/// Where a variable's value lives when referenced from code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// A top-level binding with its global index
    Global(u64),
    Pointer,
    Int,
    Str,
}

/// The smallest expressions allowed in argument position
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Lit(Literal),
    Name(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Updateable {
    /// Allocate an updateable thunk; overwrite with its value on entry
    U,
    /// No update frame needed
    N,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StgExpr {
    Lit(Literal),
    /// Saturated application of a name to atoms
    Apply(String, Vec<Atom>),
    /// Saturated constructor application
    Constructor(Tag, Vec<Atom>),
    /// Saturated builtin application
    Builtin(Builtin, Vec<Atom>),
    Case(Box<StgExpr>, Box<StgAlts>),
    Let(Vec<StgBinding>, Box<StgExpr>),
    /// Pattern-match failure
    Error(String),
}

/// Shallow alternatives, partitioned by scrutinee kind
#[derive(Debug, Clone, PartialEq)]
pub enum StgAlts {
    Int(Vec<(i64, StgExpr)>, StgDefault),
    Bool(Vec<(bool, StgExpr)>, StgDefault),
    Str(Vec<(String, StgExpr)>, StgDefault),
    Constructor(Vec<(Tag, Vec<String>, StgExpr)>, StgDefault),
}

/// The single default every alternative set carries
#[derive(Debug, Clone, PartialEq)]
pub struct StgDefault {
    pub binder: Option<String>,
    pub body: Box<StgExpr>,
}

/// (free variables, updateable flag, parameters, body)
///
/// `free` is filled by the annotation pass, ordered pointers then ints
/// then strings, without duplicates. `ret` records the body's value
/// kind, which selects the update code a thunk entry pushes.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaForm {
    pub free: Vec<(String, ValueKind)>,
    pub updateable: Updateable,
    pub params: Vec<String>,
    pub ret: ValueKind,
    pub body: StgExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StgBinding {
    pub name: String,
    pub lf: LambdaForm,
}

/// Top-level bindings plus the program entry form.
///
/// The entry form has global index 0; the bindings follow in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct StgProgram {
    pub bindings: Vec<StgBinding>,
    pub entry: LambdaForm,
}

impl StgProgram {
    /// Global indices: entry first, then bindings in declaration order
    pub fn global_indices(&self) -> HashMap<String, u64> {
        self.bindings
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name.clone(), i as u64 + 1))
            .collect()
    }
}

/// The value kind a type's runtime representation has
pub fn kind_of_type(ty: &Type) -> ValueKind {
    match ty {
        Type::Int => ValueKind::Int,
        Type::Str => ValueKind::Str,
        _ => ValueKind::Pointer,
    }
}

/// Lower a typed program to STG and annotate free variables
pub fn lower_stg(
    program: &TypedProgram,
    names: &mut NameSource,
) -> Result<StgProgram, CompileError> {
    let mut lowerer = Lowerer {
        names,
        evaluated: HashMap::new(),
    };

    let mut bindings = Vec::with_capacity(program.defs.len());
    for def in &program.defs {
        let lf = lowerer.def_to_lambda(def)?;
        bindings.push(StgBinding {
            name: def.name.clone(),
            lf,
        });
    }

    let entry = LambdaForm {
        free: Vec::new(),
        updateable: Updateable::N,
        params: Vec::new(),
        ret: ValueKind::Pointer,
        body: StgExpr::Apply("main".to_string(), Vec::new()),
    };

    let mut program = StgProgram { bindings, entry };
    annotate(&mut program);
    Ok(program)
}

struct Lowerer<'a> {
    names: &'a mut NameSource,
    /// Names bound by primitive case defaults, known to be evaluated
    evaluated: HashMap<String, ValueKind>,
}

impl<'a> Lowerer<'a> {
    fn def_to_lambda(&mut self, def: &TDef) -> Result<LambdaForm, CompileError> {
        self.expr_to_lambda(&def.body)
    }

    /// Strip outer lambdas and compile the body
    fn expr_to_lambda(&mut self, expr: &TExpr) -> Result<LambdaForm, CompileError> {
        let mut params = Vec::new();
        let mut body = expr;
        while let TExprKind::Lambda(ps, inner) = &body.kind {
            params.extend(ps.iter().cloned());
            body = inner.as_ref();
        }

        let ret = kind_of_type(&body.ty);
        let updateable = if params.is_empty() {
            Updateable::U
        } else {
            Updateable::N
        };
        let body = self.convert_expr(body)?;
        Ok(LambdaForm {
            free: Vec::new(),
            updateable,
            params,
            ret,
            body,
        })
    }

    /// Compile any expression to a lambda form and a fresh name for it
    fn atomize(&mut self, expr: &TExpr) -> Result<(Vec<StgBinding>, Atom), CompileError> {
        match &expr.kind {
            TExprKind::Lit(Literal::Bool(b)) => {
                // Boolean literals in argument position become nullary
                // constructor closures
                let name = self.names.fresh();
                let lf = LambdaForm {
                    free: Vec::new(),
                    updateable: Updateable::N,
                    params: Vec::new(),
                    ret: ValueKind::Pointer,
                    body: StgExpr::Constructor(*b as Tag, Vec::new()),
                };
                Ok((vec![StgBinding { name: name.clone(), lf }], Atom::Name(name)))
            }
            TExprKind::Lit(lit) => Ok((Vec::new(), Atom::Lit(lit.clone()))),
            TExprKind::Name(n) => Ok((Vec::new(), Atom::Name(n.clone()))),
            _ => {
                let name = self.names.fresh();
                let lf = self.expr_to_lambda(expr)?;
                Ok((vec![StgBinding { name: name.clone(), lf }], Atom::Name(name)))
            }
        }
    }

    fn atomize_all(
        &mut self,
        exprs: &[TExpr],
    ) -> Result<(Vec<StgBinding>, Vec<Atom>), CompileError> {
        let mut bindings = Vec::new();
        let mut atoms = Vec::with_capacity(exprs.len());
        for e in exprs {
            let (bs, atom) = self.atomize(e)?;
            bindings.extend(bs);
            atoms.push(atom);
        }
        Ok((bindings, atoms))
    }

    fn convert_expr(&mut self, expr: &TExpr) -> Result<StgExpr, CompileError> {
        match &expr.kind {
            TExprKind::Lit(lit) => Ok(StgExpr::Lit(lit.clone())),
            TExprKind::Name(n) => Ok(StgExpr::Apply(n.clone(), Vec::new())),
            TExprKind::Fail(msg) => Ok(StgExpr::Error(msg.clone())),
            TExprKind::Builtin(op, args) => {
                if args.len() != op.arity() {
                    return Err(CompileError::UnsaturatedBuiltin(*op, args.len()));
                }
                let (bindings, atoms) = self.atomize_all(args)?;
                let forced = self.force_builtin(*op, atoms);
                Ok(make_let(bindings, forced))
            }
            TExprKind::Constructor { tag, args, .. } => {
                let (bindings, atoms) = self.atomize_all(args)?;
                Ok(make_let(bindings, StgExpr::Constructor(*tag, atoms)))
            }
            TExprKind::Apply(_, _) => self.convert_application(expr),
            TExprKind::Lambda(_, _) => {
                // A bare lambda becomes a fresh binding entered with no
                // arguments
                let (bindings, atom) = self.atomize(expr)?;
                let name = match atom {
                    Atom::Name(n) => n,
                    Atom::Lit(_) => return Err(CompileError::LiteralInFunctionPosition),
                };
                Ok(make_let(bindings, StgExpr::Apply(name, Vec::new())))
            }
            TExprKind::Let(defs, body) => {
                let mut bindings = Vec::with_capacity(defs.len());
                for def in defs {
                    let lf = self.def_to_lambda(def)?;
                    bindings.push(StgBinding {
                        name: def.name.clone(),
                        lf,
                    });
                }
                let body = self.convert_expr(body)?;
                Ok(make_let(bindings, body))
            }
            TExprKind::Case(scrutinee, alts) => {
                let scrut = self.convert_expr(scrutinee)?;
                let alts = self.convert_alts(alts)?;
                Ok(StgExpr::Case(Box::new(scrut), Box::new(alts)))
            }
        }
    }

    /// Flatten an application spine and dispatch on its head
    fn convert_application(&mut self, expr: &TExpr) -> Result<StgExpr, CompileError> {
        let mut head = expr;
        let mut args = Vec::new();
        while let TExprKind::Apply(f, a) = &head.kind {
            args.push(a.as_ref());
            head = f.as_ref();
        }
        args.reverse();

        let arg_exprs: Vec<TExpr> = args.into_iter().cloned().collect();
        let (mut bindings, atoms) = self.atomize_all(&arg_exprs)?;

        let name = match &head.kind {
            TExprKind::Name(n) => n.clone(),
            TExprKind::Lit(_) => return Err(CompileError::LiteralInFunctionPosition),
            _ => {
                // Atomize the head as well
                let (bs, atom) = self.atomize(head)?;
                bindings.extend(bs);
                match atom {
                    Atom::Name(n) => n,
                    Atom::Lit(_) => return Err(CompileError::LiteralInFunctionPosition),
                }
            }
        };

        Ok(make_let(bindings, StgExpr::Apply(name, atoms)))
    }

    /// Wrap a builtin in forcing cases for every operand that is not a
    /// literal or an already-evaluated binding
    fn force_builtin(&mut self, op: Builtin, atoms: Vec<Atom>) -> StgExpr {
        let param_kinds = builtin_param_kinds(op);
        let mut forced = Vec::with_capacity(atoms.len());
        let mut wraps: Vec<(String, String, ValueKind)> = Vec::new();

        for (atom, kind) in atoms.into_iter().zip(param_kinds) {
            match &atom {
                Atom::Lit(_) => forced.push(atom),
                Atom::Name(n) => {
                    if self.evaluated.get(n) == Some(&kind) {
                        forced.push(atom);
                    } else {
                        let bound = self.names.fresh();
                        self.evaluated.insert(bound.clone(), kind);
                        wraps.push((n.clone(), bound.clone(), kind));
                        forced.push(Atom::Name(bound));
                    }
                }
            }
        }

        let mut body = StgExpr::Builtin(op, forced);
        for (scrutinee, bound, kind) in wraps.into_iter().rev() {
            let default = StgDefault {
                binder: Some(bound),
                body: Box::new(body),
            };
            let alts = match kind {
                ValueKind::Int => StgAlts::Int(Vec::new(), default),
                ValueKind::Str => StgAlts::Str(Vec::new(), default),
                ValueKind::Pointer => unreachable!("builtins take only primitive operands"),
            };
            body = StgExpr::Case(
                Box::new(StgExpr::Apply(scrutinee, Vec::new())),
                Box::new(alts),
            );
        }
        body
    }

    fn convert_alts(&mut self, alts: &TCaseAlts) -> Result<StgAlts, CompileError> {
        let convert_default = |this: &mut Self,
                               d: &TCaseDefault,
                               kind: Option<ValueKind>|
         -> Result<StgDefault, CompileError> {
            if let (Some(binder), Some(kind)) = (&d.binder, kind) {
                this.evaluated.insert(binder.clone(), kind);
            }
            Ok(StgDefault {
                binder: d.binder.clone(),
                body: Box::new(this.convert_expr(&d.body)?),
            })
        };

        match alts {
            TCaseAlts::Int(branches, default) => {
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    out.push((*lit, self.convert_expr(body)?));
                }
                let d = convert_default(self, default, Some(ValueKind::Int))?;
                Ok(StgAlts::Int(out, d))
            }
            TCaseAlts::Bool(branches, default) => {
                if default.binder.is_some() {
                    return Err(CompileError::BoundConstructorDefault);
                }
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    out.push((*lit, self.convert_expr(body)?));
                }
                let d = convert_default(self, default, None)?;
                Ok(StgAlts::Bool(out, d))
            }
            TCaseAlts::Str(branches, default) => {
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    out.push((lit.clone(), self.convert_expr(body)?));
                }
                let d = convert_default(self, default, Some(ValueKind::Str))?;
                Ok(StgAlts::Str(out, d))
            }
            TCaseAlts::Constructor(branches, default) => {
                if default.binder.is_some() {
                    return Err(CompileError::BoundConstructorDefault);
                }
                let mut out = Vec::with_capacity(branches.len());
                for (tag, binders, body) in branches {
                    out.push((*tag, binders.clone(), self.convert_expr(body)?));
                }
                let d = convert_default(self, default, None)?;
                Ok(StgAlts::Constructor(out, d))
            }
        }
    }
}

/// `make_let([], e)` is just `e`
fn make_let(bindings: Vec<StgBinding>, body: StgExpr) -> StgExpr {
    if bindings.is_empty() {
        body
    } else {
        StgExpr::Let(bindings, Box::new(body))
    }
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

// ============================================================================
// Free-variable annotation
// ============================================================================

/// Fill in every lambda form's free-variable list.
///
/// Free variables are ordered pointers first, then ints, then strings,
/// in stable first-use order within each kind. Globals are never listed:
/// their references resolve to global indices at the use site.
pub fn annotate(program: &mut StgProgram) {
    let globals: HashSet<String> = program.bindings.iter().map(|b| b.name.clone()).collect();
    let env = HashMap::new();
    for binding in &mut program.bindings {
        annotate_lambda(&mut binding.lf, &env, &globals);
    }
    annotate_lambda(&mut program.entry, &env, &globals);
}

fn annotate_lambda(
    lf: &mut LambdaForm,
    env: &HashMap<String, ValueKind>,
    globals: &HashSet<String>,
) -> Vec<(String, ValueKind)> {
    let mut env = env.clone();
    for p in &lf.params {
        env.insert(p.clone(), ValueKind::Pointer);
    }
    let mut uses = Vec::new();
    annotate_expr(&mut lf.body, &env, globals, &mut uses);

    // Params are bound, not free
    uses.retain(|(n, _)| !lf.params.contains(n));

    let mut free = Vec::with_capacity(uses.len());
    for kind in [ValueKind::Pointer, ValueKind::Int, ValueKind::Str] {
        free.extend(uses.iter().filter(|(_, k)| *k == kind).cloned());
    }
    lf.free = free.clone();
    free
}

fn add_use(
    name: &str,
    env: &HashMap<String, ValueKind>,
    globals: &HashSet<String>,
    uses: &mut Vec<(String, ValueKind)>,
) {
    if globals.contains(name) {
        return;
    }
    if uses.iter().any(|(n, _)| n == name) {
        return;
    }
    // Unknown names cannot survive to this point; default to pointer so
    // the error surfaces in Cmm lowering rather than a panic here
    let kind = env.get(name).copied().unwrap_or(ValueKind::Pointer);
    uses.push((name.to_string(), kind));
}

fn add_atom_uses(
    atoms: &[Atom],
    env: &HashMap<String, ValueKind>,
    globals: &HashSet<String>,
    uses: &mut Vec<(String, ValueKind)>,
) {
    for atom in atoms {
        if let Atom::Name(n) = atom {
            add_use(n, env, globals, uses);
        }
    }
}

fn annotate_expr(
    expr: &mut StgExpr,
    env: &HashMap<String, ValueKind>,
    globals: &HashSet<String>,
    uses: &mut Vec<(String, ValueKind)>,
) {
    match expr {
        StgExpr::Lit(_) | StgExpr::Error(_) => {}
        StgExpr::Apply(f, atoms) => {
            add_use(f, env, globals, uses);
            add_atom_uses(atoms, env, globals, uses);
        }
        StgExpr::Constructor(_, atoms) | StgExpr::Builtin(_, atoms) => {
            add_atom_uses(atoms, env, globals, uses);
        }
        StgExpr::Let(bindings, body) => {
            let mut inner = env.clone();
            for b in bindings.iter() {
                inner.insert(b.name.clone(), ValueKind::Pointer);
            }
            let names: Vec<String> = bindings.iter().map(|b| b.name.clone()).collect();
            let mut local_uses = Vec::new();
            for b in bindings.iter_mut() {
                for used in annotate_lambda(&mut b.lf, &inner, globals) {
                    if !local_uses.contains(&used) {
                        local_uses.push(used);
                    }
                }
            }
            annotate_expr(body, &inner, globals, &mut local_uses);
            for used in local_uses {
                if !names.contains(&used.0) && !uses.contains(&used) {
                    uses.push(used);
                }
            }
        }
        StgExpr::Case(scrutinee, alts) => {
            annotate_expr(scrutinee, env, globals, uses);
            let mut note = |body: &mut StgExpr,
                            bound: &[(String, ValueKind)],
                            uses: &mut Vec<(String, ValueKind)>| {
                let mut inner = env.clone();
                for (n, k) in bound {
                    inner.insert(n.clone(), *k);
                }
                let mut local = Vec::new();
                annotate_expr(body, &inner, globals, &mut local);
                for used in local {
                    if !bound.iter().any(|(n, _)| *n == used.0) && !uses.contains(&used) {
                        uses.push(used);
                    }
                }
            };
            match alts.as_mut() {
                StgAlts::Int(branches, d) => {
                    for (_, body) in branches {
                        note(body, &[], uses);
                    }
                    let bound: Vec<(String, ValueKind)> = d
                        .binder
                        .iter()
                        .map(|b| (b.clone(), ValueKind::Int))
                        .collect();
                    note(&mut d.body, &bound, uses);
                }
                StgAlts::Bool(branches, d) => {
                    for (_, body) in branches {
                        note(body, &[], uses);
                    }
                    note(&mut d.body, &[], uses);
                }
                StgAlts::Str(branches, d) => {
                    for (_, body) in branches {
                        note(body, &[], uses);
                    }
                    let bound: Vec<(String, ValueKind)> = d
                        .binder
                        .iter()
                        .map(|b| (b.clone(), ValueKind::Str))
                        .collect();
                    note(&mut d.body, &bound, uses);
                }
                StgAlts::Constructor(branches, d) => {
                    for (_, binders, body) in branches {
                        let bound: Vec<(String, ValueKind)> = binders
                            .iter()
                            .map(|b| (b.clone(), ValueKind::Pointer))
                            .collect();
                        note(body, &bound, uses);
                    }
                    note(&mut d.body, &[], uses);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::infer;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::simplifier::simplify;
    use crate::types::TypeContext;

    fn lower_source(input: &str) -> StgProgram {
        let tokens = Lexer::new(input).tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        let ctx = TypeContext::from_program(&program).unwrap();
        let mut names = NameSource::new();
        let simplified = simplify(&program, &ctx, &mut names).unwrap();
        let typed = infer(&simplified, ctx).unwrap();
        lower_stg(&typed, &mut names).unwrap()
    }

    fn binding<'p>(program: &'p StgProgram, name: &str) -> &'p StgBinding {
        program.bindings.iter().find(|b| b.name == name).unwrap()
    }

    #[test]
    fn test_entry_applies_main() {
        let program = lower_source("main = printInt 42");
        assert_eq!(
            program.entry.body,
            StgExpr::Apply("main".to_string(), Vec::new())
        );
    }

    #[test]
    fn test_builtin_literal_args_stay_atomic() {
        let program = lower_source("main = printInt 42");
        let main = binding(&program, "main");
        assert_eq!(
            main.lf.body,
            StgExpr::Builtin(Builtin::PrintInt, vec![Atom::Lit(Literal::Int(42))])
        );
    }

    #[test]
    fn test_nested_builtin_atomized_and_forced() {
        // 1 + 2 * 3: the inner product becomes a thunk, then a forcing
        // case feeds its value to the addition
        let program = lower_source("main = printInt (1 + 2 * 3)");
        let main = binding(&program, "main");
        match &main.lf.body {
            StgExpr::Let(bindings, body) => {
                assert_eq!(bindings.len(), 1);
                assert_eq!(bindings[0].lf.updateable, Updateable::U);
                assert_eq!(bindings[0].lf.ret, ValueKind::Int);
                // The outer sum is itself a thunk under the print
                match body.as_ref() {
                    StgExpr::Case(scrut, alts) => {
                        assert!(matches!(scrut.as_ref(), StgExpr::Apply(_, _)));
                        assert!(matches!(alts.as_ref(), StgAlts::Int(_, _)));
                    }
                    StgExpr::Let(_, _) => {}
                    other => panic!("unexpected body {:?}", other),
                }
            }
            StgExpr::Case(_, _) => {}
            other => panic!("expected let of thunks, got {:?}", other),
        }
    }

    #[test]
    fn test_function_params_not_free() {
        let program = lower_source("f x = x + 1; main = printInt (f 1)");
        let f = binding(&program, "f");
        assert_eq!(f.lf.params.len(), 1);
        assert_eq!(f.lf.updateable, Updateable::N);
        assert!(f.lf.free.is_empty());
    }

    #[test]
    fn test_captured_variable_is_free() {
        let program = lower_source("f x = let g y = y + x in g 1; main = printInt (f 1)");
        let f = binding(&program, "f");
        match &f.lf.body {
            StgExpr::Let(bindings, _) => {
                let g = &bindings[0];
                assert_eq!(g.lf.params.len(), 1);
                // g captures x as a pointer
                assert_eq!(g.lf.free.len(), 1);
                assert_eq!(g.lf.free[0].1, ValueKind::Pointer);
            }
            other => panic!("expected let, got {:?}", other),
        }
    }

    #[test]
    fn test_globals_not_captured() {
        let program = lower_source(
            "data L = N | C Int L; ones = C 1 ones; main = printInt 0",
        );
        let ones = binding(&program, "ones");
        // The literal stays atomic and the self-reference resolves
        // globally, so nothing is captured
        match &ones.lf.body {
            StgExpr::Constructor(tag, atoms) => {
                assert_eq!(*tag, 1);
                assert_eq!(atoms[0], Atom::Lit(Literal::Int(1)));
                assert_eq!(atoms[1], Atom::Name("ones".to_string()));
            }
            other => panic!("expected constructor, got {:?}", other),
        }
        assert!(ones.lf.free.is_empty());
    }

    #[test]
    fn test_case_binder_has_int_kind() {
        let program = lower_source(
            "data L = N | C Int L; sum N = 0; sum (C x xs) = x + sum xs; \
             main = printInt (sum N)",
        );
        let sum = binding(&program, "sum");
        match &sum.lf.body {
            StgExpr::Case(_, alts) => match alts.as_ref() {
                StgAlts::Constructor(branches, _) => {
                    assert_eq!(branches.len(), 2);
                    let (tag, binders, _) = &branches[1];
                    assert_eq!(*tag, 1);
                    assert_eq!(binders.len(), 2);
                }
                other => panic!("expected constructor alts, got {:?}", other),
            },
            other => panic!("expected case, got {:?}", other),
        }
    }

    #[test]
    fn test_free_variable_order_is_stable() {
        // Lowering twice with fresh counters produces identical output
        let a = lower_source("f x = x + 1; main = printInt (f (f 10))");
        let b = lower_source("f x = x + 1; main = printInt (f (f 10))");
        assert_eq!(a, b);
    }

    #[test]
    fn test_global_indices() {
        let program = lower_source("f x = x; main = printInt 0");
        let indices = program.global_indices();
        assert_eq!(indices["f"], 1);
        assert_eq!(indices["main"], 2);
    }

    #[test]
    fn test_bool_literal_argument_becomes_closure() {
        let program = lower_source(
            "data T = T; f b = 0; main = printInt (f True)",
        );
        let main = binding(&program, "main");
        // `True` cannot ride the stack as a raw literal; it becomes a
        // nullary constructor binding
        fn has_bool_ctor(e: &StgExpr) -> bool {
            match e {
                StgExpr::Let(bs, body) => {
                    bs.iter().any(|b| {
                        matches!(b.lf.body, StgExpr::Constructor(1, ref a) if a.is_empty())
                            || has_bool_ctor(&b.lf.body)
                    }) || has_bool_ctor(body)
                }
                StgExpr::Case(s, _) => has_bool_ctor(s),
                _ => false,
            }
        }
        assert!(has_bool_ctor(&main.lf.body));
    }
}

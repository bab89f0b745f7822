//! Hindley-Milner type inference over the simplified AST
//!
//! Constraints are collected into a queue while provisional types are
//! assigned, and a pure solver turns the queue into a substitution.
//! Substitutions compose; nothing is threaded through mutable links.
//! Generalization happens per definition group, so mutual recursion
//! within a group is monomorphic unless annotated.

use std::collections::{HashMap, HashSet};

use crate::ast::{Builtin, Literal};
use crate::simplifier::{CaseAlts, CaseDefault, SimpDef, SimpExpr, SimpProgram};
use crate::tast::{TCaseAlts, TCaseDefault, TDef, TExpr, TExprKind, TypedProgram};
use crate::types::{Scheme, Subst, Type, TypeContext};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypeError {
    #[error("unbound variable: {0}")]
    UnboundVariable(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    Mismatch { expected: Type, found: Type },
    #[error("occurs check failed: {0} occurs in {1}")]
    OccursCheck(String, Type),
}

/// A single equality constraint between two types
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Equal(Type, Type),
}

/// Unify two types into a substitution
pub fn unify(t1: &Type, t2: &Type) -> Result<Subst, TypeError> {
    match (t1, t2) {
        (Type::Int, Type::Int) | (Type::Str, Type::Str) | (Type::Bool, Type::Bool) => {
            Ok(Subst::empty())
        }
        (Type::Var(v1), Type::Var(v2)) if v1 == v2 => Ok(Subst::empty()),
        (Type::Var(v), other) | (other, Type::Var(v)) => {
            if other.occurs(v) {
                Err(TypeError::OccursCheck(v.clone(), other.clone()))
            } else {
                Ok(Subst::singleton(v.clone(), other.clone()))
            }
        }
        (Type::Named(n1, args1), Type::Named(n2, args2))
            if n1 == n2 && args1.len() == args2.len() =>
        {
            let mut subst = Subst::empty();
            for (a1, a2) in args1.iter().zip(args2) {
                let s = unify(&subst.apply(a1), &subst.apply(a2))?;
                subst = s.compose(&subst);
            }
            Ok(subst)
        }
        (Type::Function(a1, r1), Type::Function(a2, r2)) => {
            let s1 = unify(a1, a2)?;
            let s2 = unify(&s1.apply(r1), &s1.apply(r2))?;
            Ok(s2.compose(&s1))
        }
        _ => Err(TypeError::Mismatch {
            expected: t1.clone(),
            found: t2.clone(),
        }),
    }
}

/// Solve a constraint queue into a single substitution
pub fn solve(constraints: &[Constraint]) -> Result<Subst, TypeError> {
    let mut subst = Subst::empty();
    for Constraint::Equal(t1, t2) in constraints {
        let s = unify(&subst.apply(t1), &subst.apply(t2))?;
        subst = s.compose(&subst);
    }
    Ok(subst)
}

/// Infer and annotate a simplified program
pub fn infer(program: &SimpProgram, ctx: TypeContext) -> Result<TypedProgram, TypeError> {
    let mut inferencer = Inferencer {
        ctx: &ctx,
        next_var: 0,
        subst: Subst::empty(),
        constraints: Vec::new(),
        env: vec![HashMap::new()],
    };

    let mut defs = inferencer.infer_def_groups(&program.defs)?;

    // One final application so every recorded type reflects the full
    // solution
    let subst = inferencer.subst.clone();
    for def in &mut defs {
        def.ty = subst.apply(&def.ty);
        def.scheme = subst.apply_scheme(&def.scheme);
        apply_texpr(&subst, &mut def.body);
    }

    Ok(TypedProgram { defs, ctx })
}

struct Inferencer<'a> {
    ctx: &'a TypeContext,
    next_var: u64,
    subst: Subst,
    constraints: Vec<Constraint>,
    env: Vec<HashMap<String, Scheme>>,
}

impl<'a> Inferencer<'a> {
    fn fresh(&mut self) -> Type {
        let v = format!("t{}", self.next_var);
        self.next_var += 1;
        Type::Var(v)
    }

    fn constrain(&mut self, t1: Type, t2: Type) {
        self.constraints.push(Constraint::Equal(t1, t2));
    }

    /// Solve the pending queue and fold the result into the running
    /// substitution
    fn solve_pending(&mut self) -> Result<(), TypeError> {
        let applied: Vec<Constraint> = self
            .constraints
            .drain(..)
            .map(|Constraint::Equal(a, b)| {
                Constraint::Equal(self.subst.apply(&a), self.subst.apply(&b))
            })
            .collect();
        let s = solve(&applied)?;
        self.subst = s.compose(&self.subst);
        Ok(())
    }

    fn lookup(&mut self, name: &str) -> Result<Type, TypeError> {
        for scope in self.env.iter().rev() {
            if let Some(scheme) = scope.get(name) {
                let scheme = scheme.clone();
                return Ok(self.instantiate(&scheme));
            }
        }
        Err(TypeError::UnboundVariable(name.to_string()))
    }

    fn instantiate(&mut self, scheme: &Scheme) -> Type {
        let scheme = self.subst.apply_scheme(scheme);
        let mut fresh = Subst::empty();
        for v in &scheme.vars {
            let t = self.fresh();
            fresh.0.insert(v.clone(), t);
        }
        fresh.apply(&scheme.ty)
    }

    /// Replace a scheme's quantified variables by rigid stand-ins, so a
    /// body checked against an annotation cannot specialize it
    fn skolemize(&mut self, scheme: &Scheme) -> Type {
        let mut rigid = Subst::empty();
        for v in &scheme.vars {
            let n = self.next_var;
            self.next_var += 1;
            // `$` cannot appear in a source type name
            rigid
                .0
                .insert(v.clone(), Type::Named(format!("${}", n), Vec::new()));
        }
        rigid.apply(&scheme.ty)
    }

    fn generalize(&self, ty: &Type) -> Scheme {
        let ty = self.subst.apply(ty);
        let mut ty_vars = HashSet::new();
        ty.free_vars(&mut ty_vars);

        let mut env_vars = HashSet::new();
        for scope in &self.env {
            for scheme in scope.values() {
                let applied = self.subst.apply_scheme(scheme);
                let mut inner = HashSet::new();
                applied.ty.free_vars(&mut inner);
                for v in &applied.vars {
                    inner.remove(v);
                }
                env_vars.extend(inner);
            }
        }

        let mut vars: Vec<String> = ty_vars.difference(&env_vars).cloned().collect();
        vars.sort();
        Scheme { vars, ty }
    }

    /// Infer a definition list by binding groups.
    ///
    /// Definitions are split into strongly connected components of
    /// their dependency graph and inferred dependencies-first, so a
    /// polymorphic definition is generalized before its uses. Pushes
    /// one scope holding every resulting scheme; the caller pops it.
    fn infer_def_groups(&mut self, defs: &[SimpDef]) -> Result<Vec<TDef>, TypeError> {
        let groups = binding_groups(defs);
        self.env.push(HashMap::new());

        let mut out: Vec<Option<TDef>> = (0..defs.len()).map(|_| None).collect();
        for group in groups {
            let group_defs: Vec<&SimpDef> = group.iter().map(|&i| &defs[i]).collect();
            let tdefs = self.infer_group(&group_defs)?;
            for (&i, td) in group.iter().zip(tdefs) {
                self.env
                    .last_mut()
                    .expect("definitions scope was just pushed")
                    .insert(td.name.clone(), td.scheme.clone());
                out[i] = Some(td);
            }
        }

        Ok(out.into_iter().map(|o| o.expect("every group emitted")).collect())
    }

    /// Infer one mutually recursive definition group.
    ///
    /// Members see each other monomorphically unless annotated.
    fn infer_group(&mut self, defs: &[&SimpDef]) -> Result<Vec<TDef>, TypeError> {
        // Assumptions first, so bodies can reference every sibling
        let mut assumed = Vec::with_capacity(defs.len());
        let mut scope = HashMap::new();
        for def in defs {
            let assumption = match &def.scheme {
                Some(scheme) => scheme.clone(),
                None => Scheme::mono(self.fresh()),
            };
            scope.insert(def.name.clone(), assumption.clone());
            assumed.push(assumption);
        }
        self.env.push(scope);

        let mut bodies = Vec::with_capacity(defs.len());
        for (def, assumption) in defs.iter().zip(&assumed) {
            let body = self.infer_expr(&def.body)?;
            let expected = if assumption.vars.is_empty() {
                assumption.ty.clone()
            } else {
                // Annotated polymorphic definitions are checked rigidly
                self.skolemize(assumption)
            };
            self.constrain(body.ty.clone(), expected);
            bodies.push(body);
        }
        self.solve_pending()?;

        self.env.pop();
        let mut out = Vec::with_capacity(defs.len());
        for ((def, assumption), body) in defs.iter().zip(assumed).zip(bodies) {
            let ty = self.subst.apply(&assumption.ty);
            let scheme = match &def.scheme {
                Some(s) => s.clone(),
                None => self.generalize(&ty),
            };
            out.push(TDef {
                name: def.name.clone(),
                scheme,
                ty,
                body,
            });
        }
        Ok(out)
    }

    fn infer_expr(&mut self, expr: &SimpExpr) -> Result<TExpr, TypeError> {
        match expr {
            SimpExpr::Lit(lit) => {
                let ty = match lit {
                    Literal::Int(_) => Type::Int,
                    Literal::Str(_) => Type::Str,
                    Literal::Bool(_) => Type::Bool,
                };
                Ok(TExpr::new(TExprKind::Lit(lit.clone()), ty))
            }
            SimpExpr::Name(name) => {
                let ty = self.lookup(name)?;
                Ok(TExpr::new(TExprKind::Name(name.clone()), ty))
            }
            SimpExpr::Builtin(op, args) => {
                let (params, result) = builtin_signature(*op);
                let mut targs = Vec::with_capacity(args.len());
                for (arg, param) in args.iter().zip(params) {
                    let targ = self.infer_expr(arg)?;
                    self.constrain(targ.ty.clone(), param);
                    targs.push(targ);
                }
                Ok(TExpr::new(TExprKind::Builtin(*op, targs), result))
            }
            SimpExpr::Constructor(name, args) => {
                let info = self
                    .ctx
                    .constructors
                    .get(name)
                    .ok_or_else(|| TypeError::UnboundVariable(name.clone()))?;
                let tag = info.tag;
                let mut ty = self.instantiate(&info.scheme.clone());
                let mut targs = Vec::with_capacity(args.len());
                for arg in args {
                    let targ = self.infer_expr(arg)?;
                    let (param, rest) = match ty {
                        Type::Function(a, r) => (*a, *r),
                        other => {
                            // The simplifier saturates constructors
                            return Err(TypeError::Mismatch {
                                expected: Type::func(targ.ty.clone(), self.fresh()),
                                found: other,
                            });
                        }
                    };
                    self.constrain(targ.ty.clone(), param);
                    targs.push(targ);
                    ty = rest;
                }
                Ok(TExpr::new(
                    TExprKind::Constructor {
                        name: name.clone(),
                        tag,
                        args: targs,
                    },
                    ty,
                ))
            }
            SimpExpr::Apply(f, a) => {
                let tf = self.infer_expr(f)?;
                let ta = self.infer_expr(a)?;
                let result = self.fresh();
                self.constrain(
                    tf.ty.clone(),
                    Type::func(ta.ty.clone(), result.clone()),
                );
                Ok(TExpr::new(
                    TExprKind::Apply(Box::new(tf), Box::new(ta)),
                    result,
                ))
            }
            SimpExpr::Lambda(params, body) => {
                let mut scope = HashMap::new();
                let mut param_tys = Vec::with_capacity(params.len());
                for p in params {
                    let t = self.fresh();
                    scope.insert(p.clone(), Scheme::mono(t.clone()));
                    param_tys.push(t);
                }
                self.env.push(scope);
                let tbody = self.infer_expr(body)?;
                self.env.pop();

                let ty = param_tys
                    .into_iter()
                    .rev()
                    .fold(tbody.ty.clone(), |acc, p| Type::func(p, acc));
                Ok(TExpr::new(
                    TExprKind::Lambda(params.clone(), Box::new(tbody)),
                    ty,
                ))
            }
            SimpExpr::Let(defs, body) => {
                let tdefs = self.infer_def_groups(defs)?;
                let tbody = self.infer_expr(body)?;
                self.env.pop();
                let ty = tbody.ty.clone();
                Ok(TExpr::new(TExprKind::Let(tdefs, Box::new(tbody)), ty))
            }
            SimpExpr::Case(scrutinee, alts) => self.infer_case(scrutinee, alts),
            SimpExpr::Fail(msg) => {
                let ty = self.fresh();
                Ok(TExpr::new(TExprKind::Fail(msg.clone()), ty))
            }
        }
    }

    fn infer_case(
        &mut self,
        scrutinee: &SimpExpr,
        alts: &CaseAlts,
    ) -> Result<TExpr, TypeError> {
        let tscrut = self.infer_expr(scrutinee)?;
        let result = self.fresh();

        let infer_default = |this: &mut Self,
                             d: &CaseDefault,
                             scrut_ty: Type,
                             result: &Type|
         -> Result<TCaseDefault, TypeError> {
            let mut scope = HashMap::new();
            if let Some(binder) = &d.binder {
                scope.insert(binder.clone(), Scheme::mono(scrut_ty));
            }
            this.env.push(scope);
            let body = this.infer_expr(&d.body)?;
            this.env.pop();
            this.constrain(body.ty.clone(), result.clone());
            Ok(TCaseDefault {
                binder: d.binder.clone(),
                body: Box::new(body),
            })
        };

        let talts = match alts {
            CaseAlts::Int(branches, default) => {
                self.constrain(tscrut.ty.clone(), Type::Int);
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    let tbody = self.infer_expr(body)?;
                    self.constrain(tbody.ty.clone(), result.clone());
                    out.push((*lit, tbody));
                }
                let d = infer_default(self, default, Type::Int, &result)?;
                TCaseAlts::Int(out, d)
            }
            CaseAlts::Bool(branches, default) => {
                self.constrain(tscrut.ty.clone(), Type::Bool);
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    let tbody = self.infer_expr(body)?;
                    self.constrain(tbody.ty.clone(), result.clone());
                    out.push((*lit, tbody));
                }
                let d = infer_default(self, default, Type::Bool, &result)?;
                TCaseAlts::Bool(out, d)
            }
            CaseAlts::Str(branches, default) => {
                self.constrain(tscrut.ty.clone(), Type::Str);
                let mut out = Vec::with_capacity(branches.len());
                for (lit, body) in branches {
                    let tbody = self.infer_expr(body)?;
                    self.constrain(tbody.ty.clone(), result.clone());
                    out.push((lit.clone(), tbody));
                }
                let d = infer_default(self, default, Type::Str, &result)?;
                TCaseAlts::Str(out, d)
            }
            CaseAlts::Constructor(branches, default) => {
                let mut out = Vec::with_capacity(branches.len());
                for (name, binders, body) in branches {
                    let info = self
                        .ctx
                        .constructors
                        .get(name)
                        .ok_or_else(|| TypeError::UnboundVariable(name.clone()))?
                        .clone();
                    // Instantiate the whole constructor type at once so
                    // field and result types share their variables
                    let mut ctor_ty = self.instantiate(&info.scheme);
                    let mut scope = HashMap::new();
                    for binder in binders {
                        let (field, rest) = match ctor_ty {
                            Type::Function(a, r) => (*a, *r),
                            other => {
                                return Err(TypeError::Mismatch {
                                    expected: Type::func(self.fresh(), self.fresh()),
                                    found: other,
                                })
                            }
                        };
                        scope.insert(binder.clone(), Scheme::mono(field));
                        ctor_ty = rest;
                    }
                    self.constrain(tscrut.ty.clone(), ctor_ty);

                    self.env.push(scope);
                    let tbody = self.infer_expr(body)?;
                    self.env.pop();
                    self.constrain(tbody.ty.clone(), result.clone());
                    out.push((info.tag, binders.clone(), tbody));
                }
                let scrut_ty = tscrut.ty.clone();
                let d = infer_default(self, default, scrut_ty, &result)?;
                TCaseAlts::Constructor(out, d)
            }
        };

        Ok(TExpr::new(
            TExprKind::Case(Box::new(tscrut), talts),
            result,
        ))
    }
}

// ============================================================================
// Binding groups
// ============================================================================

/// Split definitions into strongly connected components of the
/// reference graph, dependencies first.
fn binding_groups(defs: &[SimpDef]) -> Vec<Vec<usize>> {
    let index_of: HashMap<&str, usize> = defs
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.as_str(), i))
        .collect();

    let mut edges: Vec<Vec<usize>> = Vec::with_capacity(defs.len());
    for def in defs {
        let mut free = HashSet::new();
        free_names(&def.body, &mut Vec::new(), &mut free);
        let mut targets: Vec<usize> = free
            .iter()
            .filter_map(|n| index_of.get(n.as_str()).copied())
            .collect();
        targets.sort_unstable();
        edges.push(targets);
    }

    // Tarjan's algorithm; components come out dependencies-first
    struct Tarjan<'g> {
        edges: &'g [Vec<usize>],
        index: Vec<Option<u32>>,
        lowlink: Vec<u32>,
        on_stack: Vec<bool>,
        stack: Vec<usize>,
        next_index: u32,
        components: Vec<Vec<usize>>,
    }

    impl<'g> Tarjan<'g> {
        fn visit(&mut self, v: usize) {
            self.index[v] = Some(self.next_index);
            self.lowlink[v] = self.next_index;
            self.next_index += 1;
            self.stack.push(v);
            self.on_stack[v] = true;

            let edges = self.edges;
            for &w in &edges[v] {
                match self.index[w] {
                    None => {
                        self.visit(w);
                        self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                    }
                    Some(i) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(i);
                    }
                    Some(_) => {}
                }
            }

            if Some(self.lowlink[v]) == self.index[v] {
                let mut component = Vec::new();
                loop {
                    let w = self.stack.pop().expect("component members are stacked");
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                component.sort_unstable();
                self.components.push(component);
            }
        }
    }

    let mut tarjan = Tarjan {
        edges: &edges,
        index: vec![None; defs.len()],
        lowlink: vec![0; defs.len()],
        on_stack: vec![false; defs.len()],
        stack: Vec::new(),
        next_index: 0,
        components: Vec::new(),
    };
    for v in 0..defs.len() {
        if tarjan.index[v].is_none() {
            tarjan.visit(v);
        }
    }
    tarjan.components
}

/// Names an expression references that are not bound within it
fn free_names(expr: &SimpExpr, bound: &mut Vec<String>, out: &mut HashSet<String>) {
    match expr {
        SimpExpr::Lit(_) | SimpExpr::Fail(_) => {}
        SimpExpr::Name(n) => {
            if !bound.iter().any(|b| b == n) {
                out.insert(n.clone());
            }
        }
        SimpExpr::Builtin(_, args) | SimpExpr::Constructor(_, args) => {
            for a in args {
                free_names(a, bound, out);
            }
        }
        SimpExpr::Apply(f, a) => {
            free_names(f, bound, out);
            free_names(a, bound, out);
        }
        SimpExpr::Lambda(params, body) => {
            let depth = bound.len();
            bound.extend(params.iter().cloned());
            free_names(body, bound, out);
            bound.truncate(depth);
        }
        SimpExpr::Let(defs, body) => {
            let depth = bound.len();
            bound.extend(defs.iter().map(|d| d.name.clone()));
            for d in defs {
                free_names(&d.body, bound, out);
            }
            free_names(body, bound, out);
            bound.truncate(depth);
        }
        SimpExpr::Case(scrutinee, alts) => {
            free_names(scrutinee, bound, out);
            let walk_default = |d: &CaseDefault, bound: &mut Vec<String>, out: &mut HashSet<String>| {
                let depth = bound.len();
                if let Some(b) = &d.binder {
                    bound.push(b.clone());
                }
                free_names(&d.body, bound, out);
                bound.truncate(depth);
            };
            match alts {
                CaseAlts::Int(branches, d) => {
                    for (_, b) in branches {
                        free_names(b, bound, out);
                    }
                    walk_default(d, bound, out);
                }
                CaseAlts::Bool(branches, d) => {
                    for (_, b) in branches {
                        free_names(b, bound, out);
                    }
                    walk_default(d, bound, out);
                }
                CaseAlts::Str(branches, d) => {
                    for (_, b) in branches {
                        free_names(b, bound, out);
                    }
                    walk_default(d, bound, out);
                }
                CaseAlts::Constructor(branches, d) => {
                    for (_, binders, b) in branches {
                        let depth = bound.len();
                        bound.extend(binders.iter().cloned());
                        free_names(b, bound, out);
                        bound.truncate(depth);
                    }
                    walk_default(d, bound, out);
                }
            }
        }
    }
}

/// Argument and result types for each builtin
fn builtin_signature(op: Builtin) -> (Vec<Type>, Type) {
    use Builtin::*;
    match op {
        Add | Sub | Mul | Div => (vec![Type::Int, Type::Int], Type::Int),
        Less | LessEqual | Greater | GreaterEqual | EqualTo | NotEqualTo => {
            (vec![Type::Int, Type::Int], Type::Bool)
        }
        Concat => (vec![Type::Str, Type::Str], Type::Str),
        PrintInt => (vec![Type::Int], Type::unit()),
        PrintString => (vec![Type::Str], Type::unit()),
        Negate => (vec![Type::Int], Type::Int),
    }
}

fn apply_texpr(subst: &Subst, expr: &mut TExpr) {
    expr.ty = subst.apply(&expr.ty);
    match &mut expr.kind {
        TExprKind::Lit(_) | TExprKind::Name(_) | TExprKind::Fail(_) => {}
        TExprKind::Builtin(_, args) => {
            for a in args {
                apply_texpr(subst, a);
            }
        }
        TExprKind::Constructor { args, .. } => {
            for a in args {
                apply_texpr(subst, a);
            }
        }
        TExprKind::Apply(f, a) => {
            apply_texpr(subst, f);
            apply_texpr(subst, a);
        }
        TExprKind::Lambda(_, body) => apply_texpr(subst, body),
        TExprKind::Let(defs, body) => {
            for def in defs {
                def.ty = subst.apply(&def.ty);
                def.scheme = subst.apply_scheme(&def.scheme);
                apply_texpr(subst, &mut def.body);
            }
            apply_texpr(subst, body);
        }
        TExprKind::Case(scrutinee, alts) => {
            apply_texpr(subst, scrutinee);
            let default = match alts {
                TCaseAlts::Int(branches, d) => {
                    for (_, b) in branches {
                        apply_texpr(subst, b);
                    }
                    d
                }
                TCaseAlts::Bool(branches, d) => {
                    for (_, b) in branches {
                        apply_texpr(subst, b);
                    }
                    d
                }
                TCaseAlts::Str(branches, d) => {
                    for (_, b) in branches {
                        apply_texpr(subst, b);
                    }
                    d
                }
                TCaseAlts::Constructor(branches, d) => {
                    for (_, _, b) in branches {
                        apply_texpr(subst, b);
                    }
                    d
                }
            };
            apply_texpr(subst, &mut default.body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::simplifier::{simplify, NameSource};

    fn infer_source(input: &str) -> Result<TypedProgram, TypeError> {
        let tokens = Lexer::new(input).tokenize().unwrap();
        let program = Parser::new(tokens).parse_program().unwrap();
        let ctx = TypeContext::from_program(&program).unwrap();
        let mut names = NameSource::new();
        let simplified = simplify(&program, &ctx, &mut names).unwrap();
        infer(&simplified, ctx)
    }

    fn type_of(program: &TypedProgram, name: &str) -> Type {
        program
            .defs
            .iter()
            .find(|d| d.name == name)
            .unwrap()
            .ty
            .clone()
    }

    #[test]
    fn test_int_arith() {
        let program = infer_source("main = printInt (1 + 2 * 3)").unwrap();
        assert_eq!(type_of(&program, "main"), Type::unit());
    }

    #[test]
    fn test_function_type() {
        let program = infer_source("f x = x + 1; main = printInt (f 1)").unwrap();
        assert_eq!(type_of(&program, "f"), Type::func(Type::Int, Type::Int));
    }

    #[test]
    fn test_polymorphic_identity() {
        let program = infer_source("id x = x; main = printInt (id 1)").unwrap();
        let id = program.defs.iter().find(|d| d.name == "id").unwrap();
        assert_eq!(id.scheme.vars.len(), 1);
    }

    #[test]
    fn test_recursive_list_sum() {
        let program = infer_source(
            "data L = N | C Int L; sum N = 0; sum (C x xs) = x + sum xs; \
             main = printInt (sum (C 1 N))",
        )
        .unwrap();
        assert_eq!(
            type_of(&program, "sum"),
            Type::func(Type::Named("L".into(), vec![]), Type::Int)
        );
    }

    #[test]
    fn test_mismatch_rejected() {
        let err = infer_source(r#"main = printInt "hello""#).unwrap_err();
        assert!(matches!(err, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_unbound_variable() {
        let err = infer_source("main = printInt missing").unwrap_err();
        assert!(matches!(err, TypeError::UnboundVariable(_)));
    }

    #[test]
    fn test_occurs_check() {
        let err = infer_source("f x = x x; main = 0").unwrap_err();
        assert!(matches!(err, TypeError::OccursCheck(_, _)));
    }

    #[test]
    fn test_annotation_accepted() {
        let program = infer_source("f :: Int -> Int; f x = x + 1; main = printInt (f 1)").unwrap();
        assert_eq!(type_of(&program, "f"), Type::func(Type::Int, Type::Int));
    }

    #[test]
    fn test_too_specific_body_rejected() {
        // The annotation promises full polymorphism, the body is Int-only
        let err = infer_source("f :: a -> a; f x = x + 1; main = 0").unwrap_err();
        assert!(matches!(err, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_infinite_list_type() {
        let program =
            infer_source("data L = N | C Int L; ones = C 1 ones; main = 0").unwrap();
        assert_eq!(type_of(&program, "ones"), Type::Named("L".into(), vec![]));
    }

    #[test]
    fn test_case_branches_agree() {
        let err = infer_source(r#"f x = case x of { 0 -> 1; _ -> "s" }; main = 0"#).unwrap_err();
        assert!(matches!(err, TypeError::Mismatch { .. }));
    }

    #[test]
    fn test_polymorphic_constructor() {
        let program = infer_source(
            "data Pair a b = P a b; swap (P x y) = P y x; main = 0",
        )
        .unwrap();
        let swap = program.defs.iter().find(|d| d.name == "swap").unwrap();
        assert_eq!(swap.scheme.vars.len(), 2);
    }
}

//! Simplification: from the surface AST to a flat, case-shallow form
//!
//! The simplifier merges multi-equation definitions, saturates builtins
//! and constructors (eta-expanding where under-applied), and compiles
//! nested pattern matrices into shallow case trees with explicit
//! defaults. Its output is the untyped simplified AST the inferencer
//! annotates.
//!
//! Pattern compilation goes through an explicit decision tree
//! (`Tree`): matrices are reduced column by column, producing
//! `Select` nodes for refutable columns, `SubstOut` nodes that bind and
//! drop all-irrefutable columns, and `Swap` nodes when the scrutinized
//! column is not the leftmost one.

use std::collections::HashMap;

use crate::ast::{Builtin, Decl, Definition, Expr, Literal, Pattern, Program};
use crate::types::{ResolutionError, Scheme, TypeContext};
use thiserror::Error;

/// The pattern-match failure message baked into generated defaults
pub const PATTERN_FAIL: &str = "Pattern Match Failure";

#[derive(Error, Debug)]
pub enum SimplifyError {
    #[error("multiple type annotations for {0}")]
    MultipleAnnotations(String),
    #[error("type annotation for {0} lacks an accompanying definition")]
    AnnotationWithoutDefinition(String),
    #[error("the equations for {0} have differing numbers of patterns")]
    DifferingPatternLengths(String),
    #[error("{0} is defined more than once")]
    MultipleDefinitions(String),
    #[error("patterns of different kinds matched against the same value")]
    MixedPatternKinds,
    #[error("no definition of main")]
    NoMainDefinition,
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// A monotonically increasing source of fresh names.
///
/// Generated names start with `$`, which the lexer rejects in source
/// identifiers, so collisions with user code are impossible.
#[derive(Debug, Clone, Default)]
pub struct NameSource {
    next: u64,
}

impl NameSource {
    pub fn new() -> Self {
        NameSource { next: 0 }
    }

    pub fn fresh(&mut self) -> String {
        let n = self.next;
        self.next += 1;
        format!("${}", n)
    }
}

// ============================================================================
// Simplified AST
// ============================================================================

/// A simplified definition; the scheme is present when the source
/// carried an annotation
#[derive(Debug, Clone, PartialEq)]
pub struct SimpDef {
    pub name: String,
    pub scheme: Option<Scheme>,
    pub body: SimpExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimpExpr {
    Lit(Literal),
    Name(String),
    /// A saturated builtin application
    Builtin(Builtin, Vec<SimpExpr>),
    /// A saturated constructor application
    Constructor(String, Vec<SimpExpr>),
    Apply(Box<SimpExpr>, Box<SimpExpr>),
    Lambda(Vec<String>, Box<SimpExpr>),
    Let(Vec<SimpDef>, Box<SimpExpr>),
    Case(Box<SimpExpr>, CaseAlts),
    /// Pattern-match failure
    Fail(String),
}

/// Shallow alternatives, partitioned by scrutinee kind.
///
/// Every alternative set carries exactly one default.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseAlts {
    Int(Vec<(i64, SimpExpr)>, CaseDefault),
    Bool(Vec<(bool, SimpExpr)>, CaseDefault),
    Str(Vec<(String, SimpExpr)>, CaseDefault),
    /// Branches carry the constructor name and the names its fields bind
    Constructor(Vec<(String, Vec<String>, SimpExpr)>, CaseDefault),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseDefault {
    /// `Some` when the default binds the scrutinee to a name
    pub binder: Option<String>,
    pub body: Box<SimpExpr>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpProgram {
    pub defs: Vec<SimpDef>,
}

// ============================================================================
// Decision trees
// ============================================================================

/// The head of a refutable pattern
#[derive(Debug, Clone, PartialEq)]
enum Head {
    Int(i64),
    Bool(bool),
    Str(String),
    Ctor(String),
}

/// A compiled pattern-match decision tree.
///
/// `Swap` and `SubstOut` record the bookkeeping steps of matrix
/// reduction; `Select` scrutinizes one occurrence.
#[derive(Debug)]
enum Tree {
    /// No row matched
    Fail,
    /// A row matched; the body has its pattern variables renamed to
    /// occurrence names
    Leaf(SimpExpr),
    /// Column `i` was rotated to the front before scrutinizing
    Swap(usize, Box<Tree>),
    /// The leading all-irrefutable column was bound and dropped
    SubstOut(Box<Tree>),
    /// Branch on the head of the leading occurrence
    Select(String, Vec<SelectBranch>, Box<Tree>),
}

#[derive(Debug)]
struct SelectBranch {
    head: Head,
    /// Fresh occurrence names for constructor fields (empty for literals)
    binders: Vec<String>,
    tree: Tree,
}

/// One row of a pattern matrix
#[derive(Debug, Clone)]
struct Row {
    pats: Vec<Pattern>,
    /// Source-name -> occurrence-name renames accumulated so far
    renames: Vec<(String, String)>,
    body: Expr,
}

// ============================================================================
// Simplifier
// ============================================================================

pub struct Simplifier<'a> {
    ctx: &'a TypeContext,
    names: &'a mut NameSource,
    /// Innermost scope last; maps a source name to its effective name
    scopes: Vec<HashMap<String, String>>,
}

/// Simplify a parsed program against its resolved type context
pub fn simplify(
    program: &Program,
    ctx: &TypeContext,
    names: &mut NameSource,
) -> Result<SimpProgram, SimplifyError> {
    let mut simplifier = Simplifier {
        ctx,
        names,
        scopes: Vec::new(),
    };

    let defs: Vec<&Definition> = program
        .decls
        .iter()
        .filter_map(|d| match d {
            Decl::Value(def) => Some(def),
            Decl::Data { .. } => None,
        })
        .collect();

    // Top-level names are in scope in every body
    let top_names: Vec<String> = grouped_names(&defs);
    simplifier.push_scope(top_names.iter().cloned());
    let simplified = simplifier.merge_definitions(&defs)?;
    simplifier.pop_scope();

    if !simplified.iter().any(|d| d.name == "main") {
        return Err(SimplifyError::NoMainDefinition);
    }

    Ok(SimpProgram { defs: simplified })
}

fn grouped_names(defs: &[&Definition]) -> Vec<String> {
    let mut names = Vec::new();
    for def in defs {
        let name = match def {
            Definition::Annotation(n, _, _) => n,
            Definition::Equation(eq) => &eq.name,
        };
        if !names.contains(name) {
            names.push(name.clone());
        }
    }
    names
}

impl<'a> Simplifier<'a> {
    // ------------------------------------------------------------------
    // Definition merging
    // ------------------------------------------------------------------

    /// Merge annotations and same-name equations into single definitions
    fn merge_definitions(
        &mut self,
        defs: &[&Definition],
    ) -> Result<Vec<SimpDef>, SimplifyError> {
        let mut annotations: HashMap<String, Scheme> = HashMap::new();
        let mut equations: Vec<(String, Vec<&crate::ast::Equation>)> = Vec::new();

        for def in defs {
            match def {
                Definition::Annotation(name, ty, _) => {
                    let scheme = self.ctx.resolve_annotation(ty)?;
                    if annotations.insert(name.clone(), scheme).is_some() {
                        return Err(SimplifyError::MultipleAnnotations(name.clone()));
                    }
                }
                Definition::Equation(eq) => {
                    match equations.iter_mut().find(|(n, _)| n == &eq.name) {
                        Some((_, eqs)) => eqs.push(eq),
                        None => equations.push((eq.name.clone(), vec![eq])),
                    }
                }
            }
        }

        for name in annotations.keys() {
            if !equations.iter().any(|(n, _)| n == name) {
                return Err(SimplifyError::AnnotationWithoutDefinition(name.clone()));
            }
        }

        let mut out = Vec::with_capacity(equations.len());
        for (name, eqs) in equations {
            let body = self.merge_equations(&name, &eqs)?;
            out.push(SimpDef {
                name: name.clone(),
                scheme: annotations.get(&name).cloned(),
                body,
            });
        }
        Ok(out)
    }

    fn merge_equations(
        &mut self,
        name: &str,
        eqs: &[&crate::ast::Equation],
    ) -> Result<SimpExpr, SimplifyError> {
        let arity = eqs[0].patterns.len();
        if eqs.iter().any(|eq| eq.patterns.len() != arity) {
            return Err(SimplifyError::DifferingPatternLengths(name.to_string()));
        }

        if arity == 0 {
            if eqs.len() > 1 {
                return Err(SimplifyError::MultipleDefinitions(name.to_string()));
            }
            return self.convert_expr(&eqs[0].body);
        }

        let occs: Vec<String> = (0..arity).map(|_| self.names.fresh()).collect();
        let rows: Vec<Row> = eqs
            .iter()
            .map(|eq| Row {
                pats: eq.patterns.clone(),
                renames: Vec::new(),
                body: eq.body.clone(),
            })
            .collect();

        self.push_scope(occs.iter().cloned());
        let tree = self.compile_matrix(&occs, rows)?;
        let body = self.tree_to_expr(tree);
        self.pop_scope();

        Ok(SimpExpr::Lambda(occs, Box::new(body)))
    }

    // ------------------------------------------------------------------
    // Pattern-matrix compilation
    // ------------------------------------------------------------------

    fn compile_matrix(&mut self, occs: &[String], rows: Vec<Row>) -> Result<Tree, SimplifyError> {
        if rows.is_empty() {
            return Ok(Tree::Fail);
        }

        // A fully irrefutable first row wins
        if rows[0].pats.iter().all(|p| p.is_irrefutable()) {
            let row = &rows[0];
            let mut renames = row.renames.clone();
            for (pat, occ) in row.pats.iter().zip(occs) {
                if let Pattern::Name(n) = pat {
                    renames.push((n.clone(), occ.clone()));
                }
            }
            let body = self.convert_with_renames(&row.body, &renames)?;
            return Ok(Tree::Leaf(body));
        }

        // Scrutinize the leftmost column any row refutes
        let col = (0..occs.len())
            .find(|&i| rows.iter().any(|r| !r.pats[i].is_irrefutable()))
            .expect("some pattern must be refutable here");

        if col != 0 {
            let occs: Vec<String> = rotate_front(occs.to_vec(), col);
            let rows: Vec<Row> = rows
                .into_iter()
                .map(|mut r| {
                    r.pats = rotate_front(r.pats, col);
                    r
                })
                .collect();
            let inner = self.compile_matrix(&occs, rows)?;
            return Ok(Tree::Swap(col, Box::new(inner)));
        }

        // All-irrefutable leading column: bind and drop it
        if rows.iter().all(|r| r.pats[0].is_irrefutable()) {
            let rest_occs = occs[1..].to_vec();
            let rows: Vec<Row> = rows
                .into_iter()
                .map(|mut r| {
                    let pat = r.pats.remove(0);
                    if let Pattern::Name(n) = pat {
                        r.renames.push((n, occs[0].clone()));
                    }
                    r
                })
                .collect();
            let inner = self.compile_matrix(&rest_occs, rows)?;
            return Ok(Tree::SubstOut(Box::new(inner)));
        }

        self.compile_select(occs, rows)
    }

    fn compile_select(&mut self, occs: &[String], rows: Vec<Row>) -> Result<Tree, SimplifyError> {
        // Heads in order of first appearance
        let mut heads: Vec<Head> = Vec::new();
        for row in &rows {
            if let Some(h) = pattern_head(&row.pats[0]) {
                if !heads.contains(&h) {
                    heads.push(h);
                }
            }
        }
        check_head_kinds(&heads)?;

        let mut branches = Vec::with_capacity(heads.len());
        for head in heads {
            let field_count = match &head {
                Head::Ctor(name) => self.ctx.constructor(name)?.arity,
                _ => 0,
            };
            let binders: Vec<String> = (0..field_count).map(|_| self.names.fresh()).collect();

            // Specialize: matching rows expand their sub-patterns,
            // irrefutable rows match any head with wildcard sub-patterns
            let mut specialized = Vec::new();
            for row in &rows {
                match specialize_row(row, &head, field_count, &occs[0]) {
                    Some(r) => specialized.push(r),
                    None => {}
                }
            }

            let mut sub_occs = binders.clone();
            sub_occs.extend_from_slice(&occs[1..]);

            self.push_scope(binders.iter().cloned());
            let tree = self.compile_matrix(&sub_occs, specialized)?;
            self.pop_scope();

            branches.push(SelectBranch {
                head,
                binders,
                tree,
            });
        }

        // The default takes the rows that match regardless of head
        let default_rows: Vec<Row> = rows
            .iter()
            .filter(|r| r.pats[0].is_irrefutable())
            .map(|r| {
                let mut r = r.clone();
                let pat = r.pats.remove(0);
                if let Pattern::Name(n) = pat {
                    r.renames.push((n, occs[0].clone()));
                }
                r
            })
            .collect();
        let default = self.compile_matrix(&occs[1..], default_rows)?;

        Ok(Tree::Select(
            occs[0].clone(),
            branches,
            Box::new(default),
        ))
    }

    /// Interpret a decision tree as a simplified expression
    fn tree_to_expr(&mut self, tree: Tree) -> SimpExpr {
        match tree {
            Tree::Fail => SimpExpr::Fail(PATTERN_FAIL.to_string()),
            Tree::Leaf(body) => body,
            Tree::Swap(_, inner) | Tree::SubstOut(inner) => self.tree_to_expr(*inner),
            Tree::Select(occ, branches, default) => {
                let default_body = self.tree_to_expr(*default);
                let kind = branches
                    .first()
                    .map(|b| b.head.clone())
                    .expect("a select node always has a branch");
                let scrutinee = Box::new(SimpExpr::Name(occ.clone()));

                match kind {
                    Head::Int(_) => {
                        let alts = branches
                            .into_iter()
                            .map(|b| match b.head {
                                Head::Int(n) => (n, self.tree_to_expr(b.tree)),
                                _ => unreachable!("mixed heads rejected earlier"),
                            })
                            .collect();
                        SimpExpr::Case(
                            scrutinee,
                            CaseAlts::Int(
                                alts,
                                CaseDefault {
                                    binder: Some(occ),
                                    body: Box::new(default_body),
                                },
                            ),
                        )
                    }
                    Head::Bool(_) => {
                        // Booleans return only a tag, so the default
                        // cannot rebind the scrutinee; a reference goes
                        // through a let instead
                        let alts = branches
                            .into_iter()
                            .map(|b| match b.head {
                                Head::Bool(v) => (v, self.tree_to_expr(b.tree)),
                                _ => unreachable!("mixed heads rejected earlier"),
                            })
                            .collect();
                        SimpExpr::Case(
                            scrutinee,
                            CaseAlts::Bool(
                                alts,
                                CaseDefault {
                                    binder: None,
                                    body: Box::new(default_body),
                                },
                            ),
                        )
                    }
                    Head::Str(_) => {
                        let alts = branches
                            .into_iter()
                            .map(|b| match b.head {
                                Head::Str(s) => (s, self.tree_to_expr(b.tree)),
                                _ => unreachable!("mixed heads rejected earlier"),
                            })
                            .collect();
                        SimpExpr::Case(
                            scrutinee,
                            CaseAlts::Str(
                                alts,
                                CaseDefault {
                                    binder: Some(occ),
                                    body: Box::new(default_body),
                                },
                            ),
                        )
                    }
                    Head::Ctor(_) => {
                        let alts = branches
                            .into_iter()
                            .map(|b| match b.head {
                                Head::Ctor(name) => {
                                    (name, b.binders, self.tree_to_expr(b.tree))
                                }
                                _ => unreachable!("mixed heads rejected earlier"),
                            })
                            .collect();
                        SimpExpr::Case(
                            scrutinee,
                            CaseAlts::Constructor(
                                alts,
                                CaseDefault {
                                    binder: None,
                                    body: Box::new(default_body),
                                },
                            ),
                        )
                    }
                }
            }
        }
    }

    fn compile_case(
        &mut self,
        scrutinee: &Expr,
        arms: &[(Pattern, Expr)],
    ) -> Result<SimpExpr, SimplifyError> {
        let occ = self.names.fresh();
        let rows: Vec<Row> = arms
            .iter()
            .map(|(pat, body)| Row {
                pats: vec![pat.clone()],
                renames: Vec::new(),
                body: body.clone(),
            })
            .collect();

        self.push_scope(std::iter::once(occ.clone()));
        let tree = self.compile_matrix(std::slice::from_ref(&occ), rows)?;
        let case = self.tree_to_expr(tree);
        self.pop_scope();

        let scrut = self.convert_expr(scrutinee)?;

        // When the compiled case scrutinizes the occurrence directly and
        // never mentions it again, substitute the scrutinee in place;
        // otherwise the occurrence must become a real binding.
        match case {
            SimpExpr::Case(boxed, alts) if *boxed == SimpExpr::Name(occ.clone()) => {
                // Primitive cases can rebind the scrutinee through the
                // default binder, which only scopes the default body.
                // Any other surviving reference needs a real binding.
                let needs_let = match &alts {
                    CaseAlts::Constructor(_, _) | CaseAlts::Bool(_, _) => {
                        alts_reference(&alts, &occ)
                    }
                    _ => branches_reference(&alts, &occ),
                };
                if needs_let {
                    Ok(SimpExpr::Let(
                        vec![SimpDef {
                            name: occ.clone(),
                            scheme: None,
                            body: scrut,
                        }],
                        Box::new(SimpExpr::Case(Box::new(SimpExpr::Name(occ)), alts)),
                    ))
                } else {
                    Ok(SimpExpr::Case(Box::new(scrut), alts))
                }
            }
            // The whole match was irrefutable; share the scrutinee if a
            // variable pattern bound it
            body => {
                if occurs_free(&body, &occ) {
                    Ok(SimpExpr::Let(
                        vec![SimpDef {
                            name: occ,
                            scheme: None,
                            body: scrut,
                        }],
                        Box::new(body),
                    ))
                } else {
                    Ok(body)
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Expression conversion
    // ------------------------------------------------------------------

    fn convert_with_renames(
        &mut self,
        expr: &Expr,
        renames: &[(String, String)],
    ) -> Result<SimpExpr, SimplifyError> {
        let mut scope = HashMap::new();
        for (src, occ) in renames {
            scope.insert(src.clone(), occ.clone());
        }
        self.scopes.push(scope);
        let out = self.convert_expr(expr);
        self.scopes.pop();
        out
    }

    fn convert_expr(&mut self, expr: &Expr) -> Result<SimpExpr, SimplifyError> {
        match expr {
            Expr::Lit(lit) => Ok(SimpExpr::Lit(lit.clone())),
            Expr::Name(_) | Expr::App(_, _) => self.convert_application(expr),
            Expr::Binary(op, lhs, rhs) => Ok(SimpExpr::Builtin(
                *op,
                vec![self.convert_expr(lhs)?, self.convert_expr(rhs)?],
            )),
            Expr::Negate(e) => Ok(SimpExpr::Builtin(
                Builtin::Negate,
                vec![self.convert_expr(e)?],
            )),
            Expr::Lambda(params, body) => {
                self.push_scope(params.iter().cloned());
                let body = self.convert_expr(body)?;
                self.pop_scope();
                Ok(SimpExpr::Lambda(params.clone(), Box::new(body)))
            }
            Expr::Let(defs, body) => {
                let refs: Vec<&Definition> = defs.iter().collect();
                let names = grouped_names(&refs);
                self.push_scope(names.into_iter());
                let defs = self.merge_definitions(&refs)?;
                let body = self.convert_expr(body)?;
                self.pop_scope();
                Ok(SimpExpr::Let(defs, Box::new(body)))
            }
            Expr::Case(scrutinee, arms) => self.compile_case(scrutinee, arms),
        }
    }

    /// Convert an application spine, saturating builtins and
    /// constructors at the head
    fn convert_application(&mut self, expr: &Expr) -> Result<SimpExpr, SimplifyError> {
        let (head, args) = gather_spine(expr);
        let mut converted = Vec::with_capacity(args.len());
        for arg in &args {
            converted.push(self.convert_expr(arg)?);
        }

        let head = match head {
            Expr::Name(name) => {
                if let Some(effective) = self.lookup(name) {
                    return Ok(apply_all(SimpExpr::Name(effective), converted));
                }
                if let Some(info) = self.ctx.constructors.get(name) {
                    let arity = info.arity;
                    return Ok(self.saturate(
                        |args| SimpExpr::Constructor(name.clone(), args),
                        arity,
                        converted,
                    ));
                }
                if let Some(builtin) = builtin_by_name(name) {
                    let arity = builtin.arity();
                    return Ok(self.saturate(
                        |args| SimpExpr::Builtin(builtin, args),
                        arity,
                        converted,
                    ));
                }
                // Unknown lowercase names are free (caught by the
                // inferencer); unknown uppercase names are missing
                // constructors
                if name.starts_with(|c: char| c.is_uppercase()) {
                    return Err(ResolutionError::UnknownConstructor(name.clone()).into());
                }
                SimpExpr::Name(name.clone())
            }
            other => self.convert_expr(other)?,
        };

        Ok(apply_all(head, converted))
    }

    /// Build a saturated application, eta-expanding when fewer than
    /// `arity` arguments are present
    fn saturate(
        &mut self,
        build: impl FnOnce(Vec<SimpExpr>) -> SimpExpr,
        arity: usize,
        mut args: Vec<SimpExpr>,
    ) -> SimpExpr {
        if args.len() >= arity {
            let rest = args.split_off(arity);
            apply_all(build(args), rest)
        } else {
            let missing: Vec<String> = (args.len()..arity).map(|_| self.names.fresh()).collect();
            args.extend(missing.iter().map(|n| SimpExpr::Name(n.clone())));
            SimpExpr::Lambda(missing, Box::new(build(args)))
        }
    }

    // ------------------------------------------------------------------
    // Scope helpers
    // ------------------------------------------------------------------

    fn push_scope(&mut self, names: impl Iterator<Item = String>) {
        self.scopes
            .push(names.map(|n| (n.clone(), n)).collect::<HashMap<_, _>>());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup(&self, name: &str) -> Option<String> {
        for scope in self.scopes.iter().rev() {
            if let Some(effective) = scope.get(name) {
                return Some(effective.clone());
            }
        }
        None
    }
}

// ============================================================================
// Free helpers
// ============================================================================

fn rotate_front<T>(mut items: Vec<T>, i: usize) -> Vec<T> {
    let item = items.remove(i);
    items.insert(0, item);
    items
}

fn gather_spine(expr: &Expr) -> (&Expr, Vec<&Expr>) {
    let mut head = expr;
    let mut args = Vec::new();
    while let Expr::App(f, a) = head {
        args.push(a.as_ref());
        head = f.as_ref();
    }
    args.reverse();
    (head, args)
}

fn apply_all(head: SimpExpr, args: Vec<SimpExpr>) -> SimpExpr {
    args.into_iter()
        .fold(head, |f, a| SimpExpr::Apply(Box::new(f), Box::new(a)))
}

fn builtin_by_name(name: &str) -> Option<Builtin> {
    match name {
        "printInt" => Some(Builtin::PrintInt),
        "printString" => Some(Builtin::PrintString),
        "negate" => Some(Builtin::Negate),
        _ => None,
    }
}

fn pattern_head(pat: &Pattern) -> Option<Head> {
    match pat {
        Pattern::Wildcard | Pattern::Name(_) => None,
        Pattern::Lit(Literal::Int(n)) => Some(Head::Int(*n)),
        Pattern::Lit(Literal::Bool(b)) => Some(Head::Bool(*b)),
        Pattern::Lit(Literal::Str(s)) => Some(Head::Str(s.clone())),
        Pattern::Constructor(name, _) => Some(Head::Ctor(name.clone())),
    }
}

fn check_head_kinds(heads: &[Head]) -> Result<(), SimplifyError> {
    let same = |a: &Head, b: &Head| {
        matches!(
            (a, b),
            (Head::Int(_), Head::Int(_))
                | (Head::Bool(_), Head::Bool(_))
                | (Head::Str(_), Head::Str(_))
                | (Head::Ctor(_), Head::Ctor(_))
        )
    };
    if heads.windows(2).all(|w| same(&w[0], &w[1])) {
        Ok(())
    } else {
        Err(SimplifyError::MixedPatternKinds)
    }
}

/// Specialize a row for a head, or drop it if it cannot match
fn specialize_row(row: &Row, head: &Head, field_count: usize, occ: &str) -> Option<Row> {
    let mut row = row.clone();
    let pat = row.pats.remove(0);
    match (&pat, head) {
        (Pattern::Wildcard | Pattern::Name(_), _) => {
            if let Pattern::Name(n) = pat {
                row.renames.push((n, occ.to_string()));
            }
            let mut pats = vec![Pattern::Wildcard; field_count];
            pats.extend(row.pats);
            row.pats = pats;
            Some(row)
        }
        (Pattern::Lit(Literal::Int(a)), Head::Int(b)) if a == b => Some(row),
        (Pattern::Lit(Literal::Bool(a)), Head::Bool(b)) if a == b => Some(row),
        (Pattern::Lit(Literal::Str(a)), Head::Str(b)) if a == b => Some(row),
        (Pattern::Constructor(name, subs), Head::Ctor(h)) if name == h => {
            let mut pats = subs.clone();
            pats.extend(row.pats);
            row.pats = pats;
            Some(row)
        }
        _ => None,
    }
}

fn occurs_free(expr: &SimpExpr, name: &str) -> bool {
    match expr {
        SimpExpr::Lit(_) | SimpExpr::Fail(_) => false,
        SimpExpr::Name(n) => n == name,
        SimpExpr::Builtin(_, args) | SimpExpr::Constructor(_, args) => {
            args.iter().any(|a| occurs_free(a, name))
        }
        SimpExpr::Apply(f, a) => occurs_free(f, name) || occurs_free(a, name),
        SimpExpr::Lambda(params, body) => {
            !params.iter().any(|p| p == name) && occurs_free(body, name)
        }
        SimpExpr::Let(defs, body) => {
            if defs.iter().any(|d| d.name == name) {
                return false;
            }
            defs.iter().any(|d| occurs_free(&d.body, name)) || occurs_free(body, name)
        }
        SimpExpr::Case(scrut, alts) => occurs_free(scrut, name) || alts_reference(alts, name),
    }
}

/// Does any alternative, default included, reference `name`?
fn alts_reference(alts: &CaseAlts, name: &str) -> bool {
    let d = match alts {
        CaseAlts::Int(_, d)
        | CaseAlts::Bool(_, d)
        | CaseAlts::Str(_, d)
        | CaseAlts::Constructor(_, d) => d,
    };
    branches_reference(alts, name) || occurs_free(&d.body, name)
}

/// Does a non-default alternative reference `name`?
fn branches_reference(alts: &CaseAlts, name: &str) -> bool {
    match alts {
        CaseAlts::Int(branches, _) => branches.iter().any(|(_, b)| occurs_free(b, name)),
        CaseAlts::Bool(branches, _) => branches.iter().any(|(_, b)| occurs_free(b, name)),
        CaseAlts::Str(branches, _) => branches.iter().any(|(_, b)| occurs_free(b, name)),
        CaseAlts::Constructor(branches, _) => branches
            .iter()
            .any(|(_, binders, b)| !binders.iter().any(|x| x == name) && occurs_free(b, name)),
    }
}

//! Types, schemes, and substitutions
//!
//! Substitutions are immutable maps keyed by type-variable name and are
//! returned by unification rather than threaded through mutable state; the
//! solver composes them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::ast::{ConstructorDef, Decl, Program, TypeExpr};
use thiserror::Error;

/// A monotype
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Str,
    Bool,
    /// A unification variable, named `t0`, `t1`, ...
    Var(String),
    /// A fully applied declared type constructor
    Named(String, Vec<Type>),
    Function(Box<Type>, Box<Type>),
}

impl Type {
    pub fn func(arg: Type, ret: Type) -> Type {
        Type::Function(Box::new(arg), Box::new(ret))
    }

    /// The built-in unit type
    pub fn unit() -> Type {
        Type::Named("Unit".to_string(), Vec::new())
    }

    /// The set of type variables occurring in this type
    pub fn free_vars(&self, out: &mut HashSet<String>) {
        match self {
            Type::Int | Type::Str | Type::Bool => {}
            Type::Var(v) => {
                out.insert(v.clone());
            }
            Type::Named(_, args) => {
                for a in args {
                    a.free_vars(out);
                }
            }
            Type::Function(a, r) => {
                a.free_vars(out);
                r.free_vars(out);
            }
        }
    }

    pub fn occurs(&self, var: &str) -> bool {
        match self {
            Type::Int | Type::Str | Type::Bool => false,
            Type::Var(v) => v == var,
            Type::Named(_, args) => args.iter().any(|a| a.occurs(var)),
            Type::Function(a, r) => a.occurs(var) || r.occurs(var),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Str => write!(f, "String"),
            Type::Bool => write!(f, "Bool"),
            Type::Var(v) => write!(f, "{}", v),
            Type::Named(n, args) => {
                write!(f, "{}", n)?;
                for a in args {
                    match a {
                        Type::Named(_, inner) if !inner.is_empty() => write!(f, " ({})", a)?,
                        Type::Function(_, _) => write!(f, " ({})", a)?,
                        _ => write!(f, " {}", a)?,
                    }
                }
                Ok(())
            }
            Type::Function(a, r) => match a.as_ref() {
                Type::Function(_, _) => write!(f, "({}) -> {}", a, r),
                _ => write!(f, "{} -> {}", a, r),
            },
        }
    }
}

/// A polytype: `forall vars. ty`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scheme {
    pub vars: Vec<String>,
    pub ty: Type,
}

impl Scheme {
    pub fn mono(ty: Type) -> Self {
        Scheme { vars: Vec::new(), ty }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.vars.is_empty() {
            write!(f, "{}", self.ty)
        } else {
            write!(f, "forall {}. {}", self.vars.join(" "), self.ty)
        }
    }
}

/// An immutable substitution from type-variable names to types
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subst(pub HashMap<String, Type>);

impl Subst {
    pub fn empty() -> Self {
        Subst(HashMap::new())
    }

    pub fn singleton(var: impl Into<String>, ty: Type) -> Self {
        let mut m = HashMap::new();
        m.insert(var.into(), ty);
        Subst(m)
    }

    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Int | Type::Str | Type::Bool => ty.clone(),
            Type::Var(v) => match self.0.get(v) {
                Some(t) => t.clone(),
                None => ty.clone(),
            },
            Type::Named(n, args) => {
                Type::Named(n.clone(), args.iter().map(|a| self.apply(a)).collect())
            }
            Type::Function(a, r) => Type::func(self.apply(a), self.apply(r)),
        }
    }

    pub fn apply_scheme(&self, scheme: &Scheme) -> Scheme {
        // Quantified variables are bound; drop them from the substitution
        let mut inner = self.clone();
        for v in &scheme.vars {
            inner.0.remove(v);
        }
        Scheme {
            vars: scheme.vars.clone(),
            ty: inner.apply(&scheme.ty),
        }
    }

    /// `self` after `other`: applying the result is applying `other`,
    /// then `self`
    pub fn compose(&self, other: &Subst) -> Subst {
        let mut map: HashMap<String, Type> = other
            .0
            .iter()
            .map(|(v, t)| (v.clone(), self.apply(t)))
            .collect();
        for (v, t) in &self.0 {
            map.entry(v.clone()).or_insert_with(|| t.clone());
        }
        Subst(map)
    }
}

/// What is known about a declared constructor
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorInfo {
    /// Number of fields
    pub arity: usize,
    /// The constructor's type as a scheme, e.g. `forall a. a -> List a -> List a`
    pub scheme: Scheme,
    /// Tag assigned at declaration, 0-based per type
    pub tag: u64,
    /// The data type this constructor belongs to
    pub type_name: String,
    /// Field types, with the data type's parameters still as variables
    pub fields: Vec<Type>,
}

/// Everything resolved out of the `data` declarations of a program
#[derive(Debug, Clone, Default)]
pub struct TypeContext {
    /// Constructor name -> info
    pub constructors: HashMap<String, ConstructorInfo>,
    /// Data type name -> (parameter names, constructor names in tag order)
    pub data_types: HashMap<String, (Vec<String>, Vec<String>)>,
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("unknown type: {0}")]
    UnknownType(String),
    #[error("unknown constructor: {0}")]
    UnknownConstructor(String),
    #[error("type {name} applied to {found} arguments, but declared with {expected}")]
    TypeArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("duplicate data type: {0}")]
    DuplicateType(String),
    #[error("duplicate constructor: {0}")]
    DuplicateConstructor(String),
    #[error("unbound type variable {0} in declaration of {1}")]
    UnboundTypeVar(String, String),
}

impl TypeContext {
    /// Build the context from a program's `data` declarations.
    ///
    /// Tags are assigned in declaration order within each type.
    pub fn from_program(program: &Program) -> Result<Self, ResolutionError> {
        let mut ctx = TypeContext::default();

        // The unit type is built in; the print builtins return its tag
        ctx.data_types
            .insert("Unit".to_string(), (Vec::new(), vec!["MkUnit".to_string()]));
        ctx.constructors.insert(
            "MkUnit".to_string(),
            ConstructorInfo {
                arity: 0,
                scheme: Scheme::mono(Type::unit()),
                tag: 0,
                type_name: "Unit".to_string(),
                fields: Vec::new(),
            },
        );

        // First pass so constructors can mention any declared type
        for decl in &program.decls {
            if let Decl::Data { name, params, constructors, .. } = decl {
                if ctx.data_types.contains_key(name) {
                    return Err(ResolutionError::DuplicateType(name.clone()));
                }
                let ctor_names = constructors.iter().map(|c| c.name.clone()).collect();
                ctx.data_types
                    .insert(name.clone(), (params.clone(), ctor_names));
            }
        }

        for decl in &program.decls {
            if let Decl::Data { name, params, constructors, .. } = decl {
                for (tag, ctor) in constructors.iter().enumerate() {
                    ctx.add_constructor(name, params, tag as u64, ctor)?;
                }
            }
        }

        Ok(ctx)
    }

    fn add_constructor(
        &mut self,
        type_name: &str,
        params: &[String],
        tag: u64,
        ctor: &ConstructorDef,
    ) -> Result<(), ResolutionError> {
        if self.constructors.contains_key(&ctor.name) {
            return Err(ResolutionError::DuplicateConstructor(ctor.name.clone()));
        }

        let mut fields = Vec::with_capacity(ctor.fields.len());
        for field in &ctor.fields {
            fields.push(self.resolve_with_vars(field, params, &ctor.name)?);
        }

        let result = Type::Named(
            type_name.to_string(),
            params.iter().map(|p| Type::Var(p.clone())).collect(),
        );
        let ty = fields
            .iter()
            .rev()
            .fold(result, |acc, f| Type::func(f.clone(), acc));

        self.constructors.insert(
            ctor.name.clone(),
            ConstructorInfo {
                arity: ctor.fields.len(),
                scheme: Scheme {
                    vars: params.to_vec(),
                    ty,
                },
                tag,
                type_name: type_name.to_string(),
                fields,
            },
        );
        Ok(())
    }

    /// Resolve a surface type expression where only `bound` variables may
    /// appear free
    fn resolve_with_vars(
        &self,
        expr: &TypeExpr,
        bound: &[String],
        owner: &str,
    ) -> Result<Type, ResolutionError> {
        match expr {
            TypeExpr::Int => Ok(Type::Int),
            TypeExpr::Str => Ok(Type::Str),
            TypeExpr::Bool => Ok(Type::Bool),
            TypeExpr::Var(v) => {
                if bound.contains(v) {
                    Ok(Type::Var(v.clone()))
                } else {
                    Err(ResolutionError::UnboundTypeVar(v.clone(), owner.to_string()))
                }
            }
            TypeExpr::Named(n, args) => {
                let (params, _) = self
                    .data_types
                    .get(n)
                    .ok_or_else(|| ResolutionError::UnknownType(n.clone()))?;
                if params.len() != args.len() {
                    return Err(ResolutionError::TypeArityMismatch {
                        name: n.clone(),
                        expected: params.len(),
                        found: args.len(),
                    });
                }
                let mut resolved = Vec::with_capacity(args.len());
                for a in args {
                    resolved.push(self.resolve_with_vars(a, bound, owner)?);
                }
                Ok(Type::Named(n.clone(), resolved))
            }
            TypeExpr::Function(a, r) => Ok(Type::func(
                self.resolve_with_vars(a, bound, owner)?,
                self.resolve_with_vars(r, bound, owner)?,
            )),
        }
    }

    /// Resolve a standalone annotation; its free variables become the
    /// scheme's quantified variables
    pub fn resolve_annotation(&self, expr: &TypeExpr) -> Result<Scheme, ResolutionError> {
        let mut vars = Vec::new();
        collect_type_expr_vars(expr, &mut vars);
        let ty = self.resolve_with_vars(expr, &vars, "<annotation>")?;
        Ok(Scheme { vars, ty })
    }

    pub fn constructor(&self, name: &str) -> Result<&ConstructorInfo, ResolutionError> {
        self.constructors
            .get(name)
            .ok_or_else(|| ResolutionError::UnknownConstructor(name.to_string()))
    }

    /// All constructors of the data type that `name` belongs to, in tag
    /// order
    pub fn siblings(&self, name: &str) -> Result<Vec<&ConstructorInfo>, ResolutionError> {
        let info = self.constructor(name)?;
        let (_, ctors) = &self.data_types[&info.type_name];
        Ok(ctors.iter().map(|c| &self.constructors[c]).collect())
    }
}

fn collect_type_expr_vars(expr: &TypeExpr, out: &mut Vec<String>) {
    match expr {
        TypeExpr::Int | TypeExpr::Str | TypeExpr::Bool => {}
        TypeExpr::Var(v) => {
            if !out.contains(v) {
                out.push(v.clone());
            }
        }
        TypeExpr::Named(_, args) => {
            for a in args {
                collect_type_expr_vars(a, out);
            }
        }
        TypeExpr::Function(a, r) => {
            collect_type_expr_vars(a, out);
            collect_type_expr_vars(r, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_program() -> Program {
        Program {
            decls: vec![Decl::Data {
                name: "List".into(),
                params: vec!["a".into()],
                constructors: vec![
                    ConstructorDef { name: "Nil".into(), fields: vec![] },
                    ConstructorDef {
                        name: "Cons".into(),
                        fields: vec![
                            TypeExpr::Var("a".into()),
                            TypeExpr::Named("List".into(), vec![TypeExpr::Var("a".into())]),
                        ],
                    },
                ],
                span: crate::ast::Span::new(0, 0),
            }],
        }
    }

    #[test]
    fn test_tags_in_declaration_order() {
        let ctx = TypeContext::from_program(&list_program()).unwrap();
        assert_eq!(ctx.constructor("Nil").unwrap().tag, 0);
        assert_eq!(ctx.constructor("Cons").unwrap().tag, 1);
        assert_eq!(ctx.constructor("Cons").unwrap().arity, 2);
    }

    #[test]
    fn test_constructor_scheme() {
        let ctx = TypeContext::from_program(&list_program()).unwrap();
        let cons = ctx.constructor("Cons").unwrap();
        let expected = Type::func(
            Type::Var("a".into()),
            Type::func(
                Type::Named("List".into(), vec![Type::Var("a".into())]),
                Type::Named("List".into(), vec![Type::Var("a".into())]),
            ),
        );
        assert_eq!(cons.scheme.ty, expected);
    }

    #[test]
    fn test_unknown_constructor() {
        let ctx = TypeContext::from_program(&list_program()).unwrap();
        assert!(ctx.constructor("Just").is_err());
    }

    #[test]
    fn test_subst_compose() {
        let s1 = Subst::singleton("t0", Type::Int);
        let s2 = Subst::singleton("t1", Type::Var("t0".into()));
        let s = s1.compose(&s2);
        assert_eq!(s.apply(&Type::Var("t1".into())), Type::Int);
        assert_eq!(s.apply(&Type::Var("t0".into())), Type::Int);
    }

    #[test]
    fn test_subst_scheme_respects_binders() {
        let s = Subst::singleton("a", Type::Int);
        let scheme = Scheme {
            vars: vec!["a".into()],
            ty: Type::func(Type::Var("a".into()), Type::Var("a".into())),
        };
        // `a` is bound by the scheme, so the substitution must not touch it
        assert_eq!(s.apply_scheme(&scheme), scheme);
    }
}

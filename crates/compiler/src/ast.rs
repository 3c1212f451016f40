//! The surface syntax tree consumed by the resolver/emitter.
//!
//! This is intentionally small: enough nodes to exercise every resolver and
//! emitter code path (locals, closures, globals, loops, calls) without
//! pulling in a full language grammar, which is out of scope here.

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Str(String),
    /// A bare name reference, resolved against the lexical/global scope.
    Var(String),
    /// `global:name` — skips every lexical frame and resolves directly
    /// against the global environment.
    GlobalVar(String),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    While(Box<Expr>, Box<Expr>),
    Begin(Vec<Expr>),
    /// A block introducing one or more new locals, scoped to `body`.
    Let(Vec<(String, Expr)>, Box<Expr>),
    Assign(String, Box<Expr>),
    Lambda(Vec<String>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    /// Module-level `define name = value`.
    Define(String, Box<Expr>),
}

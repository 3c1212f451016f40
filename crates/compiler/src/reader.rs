//! A minimal internal s-expression reader.
//!
//! This is a stand-in front end, not "the" parser: it exists only so the
//! resolver and emitter can be driven from test source text and from the
//! `quillc` CLI without depending on an external grammar, which is out of
//! scope. It understands integers, strings, bare symbols, and parenthesised
//! forms, with a fixed set of special forms (`if`, `while`, `begin`, `let`,
//! `set!`, `lambda`, `define`) recognised by head symbol.

use crate::ast::Expr;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderError {
    pub message: String,
}

impl fmt::Display for ReaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl std::error::Error for ReaderError {}

fn err(msg: impl Into<String>) -> ReaderError {
    ReaderError { message: msg.into() }
}

#[derive(Debug, Clone, PartialEq)]
enum Sexp {
    Int(i64),
    Str(String),
    Sym(String),
    List(Vec<Sexp>),
}

struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    fn new(src: &'a str) -> Self {
        Tokenizer { chars: src.chars().peekable() }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
                self.chars.next();
            }
            if self.chars.peek() == Some(&';') {
                while let Some(&c) = self.chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.chars.next();
                }
                continue;
            }
            break;
        }
    }

    fn read_sexp(&mut self) -> Result<Option<Sexp>, ReaderError> {
        self.skip_whitespace_and_comments();
        match self.chars.peek() {
            None => Ok(None),
            Some('(') => {
                self.chars.next();
                let mut items = Vec::new();
                loop {
                    self.skip_whitespace_and_comments();
                    if self.chars.peek() == Some(&')') {
                        self.chars.next();
                        break;
                    }
                    match self.read_sexp()? {
                        Some(s) => items.push(s),
                        None => return Err(err("unexpected end of input inside a list")),
                    }
                }
                Ok(Some(Sexp::List(items)))
            }
            Some(')') => Err(err("unexpected ')'")),
            Some('"') => {
                self.chars.next();
                let mut s = String::new();
                loop {
                    match self.chars.next() {
                        None => return Err(err("unterminated string literal")),
                        Some('"') => break,
                        Some('\\') => match self.chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some('\\') => s.push('\\'),
                            Some('"') => s.push('"'),
                            Some(other) => s.push(other),
                            None => return Err(err("unterminated escape in string literal")),
                        },
                        Some(c) => s.push(c),
                    }
                }
                Ok(Some(Sexp::Str(s)))
            }
            Some(_) => {
                let mut tok = String::new();
                while let Some(&c) = self.chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    tok.push(c);
                    self.chars.next();
                }
                if tok.is_empty() {
                    return Err(err("empty token"));
                }
                if let Ok(n) = tok.parse::<i64>() {
                    Ok(Some(Sexp::Int(n)))
                } else {
                    Ok(Some(Sexp::Sym(tok)))
                }
            }
        }
    }
}

/// Parse every top-level form in `src` as a sequence of expressions.
pub fn read_program(src: &str) -> Result<Vec<Expr>, ReaderError> {
    let mut tok = Tokenizer::new(src);
    let mut forms = Vec::new();
    while let Some(sexp) = tok.read_sexp()? {
        forms.push(sexp_to_expr(&sexp)?);
    }
    Ok(forms)
}

/// Parse exactly one top-level expression, erroring if anything trails it.
pub fn read_one(src: &str) -> Result<Expr, ReaderError> {
    let mut tok = Tokenizer::new(src);
    let sexp = tok.read_sexp()?.ok_or_else(|| err("empty input"))?;
    if tok.read_sexp()?.is_some() {
        return Err(err("trailing input after expression"));
    }
    sexp_to_expr(&sexp)
}

fn sexp_to_expr(sexp: &Sexp) -> Result<Expr, ReaderError> {
    match sexp {
        Sexp::Int(n) => Ok(Expr::Int(*n)),
        Sexp::Str(s) => Ok(Expr::Str(s.clone())),
        Sexp::Sym(s) => {
            if let Some(name) = s.strip_prefix("global:") {
                Ok(Expr::GlobalVar(name.to_string()))
            } else {
                Ok(Expr::Var(s.clone()))
            }
        }
        Sexp::List(items) => list_to_expr(items),
    }
}

fn list_to_expr(items: &[Sexp]) -> Result<Expr, ReaderError> {
    let head = items.first().ok_or_else(|| err("empty form"))?;
    let Sexp::Sym(head_name) = head else {
        return parse_call(items);
    };
    match head_name.as_str() {
        "if" => {
            let [_, cond, then, els] = items else {
                return Err(err("(if cond then else) takes exactly three arguments"));
            };
            Ok(Expr::If(
                Box::new(sexp_to_expr(cond)?),
                Box::new(sexp_to_expr(then)?),
                Box::new(sexp_to_expr(els)?),
            ))
        }
        "while" => {
            let [_, cond, body @ ..] = items else {
                return Err(err("(while cond body...) requires a condition"));
            };
            Ok(Expr::While(Box::new(sexp_to_expr(cond)?), Box::new(parse_body(body)?)))
        }
        "begin" => Ok(parse_body(&items[1..])?),
        "let" => {
            let [_, Sexp::List(bindings), body @ ..] = items else {
                return Err(err("(let ((name val)...) body...) requires a binding list"));
            };
            let mut parsed_bindings = Vec::with_capacity(bindings.len());
            for b in bindings {
                let Sexp::List(pair) = b else {
                    return Err(err("each let binding must be (name value)"));
                };
                let [Sexp::Sym(name), value] = pair.as_slice() else {
                    return Err(err("each let binding must be (name value)"));
                };
                parsed_bindings.push((name.clone(), sexp_to_expr(value)?));
            }
            Ok(Expr::Let(parsed_bindings, Box::new(parse_body(body)?)))
        }
        "set!" => {
            let [_, Sexp::Sym(name), value] = items else {
                return Err(err("(set! name value) requires a symbol and a value"));
            };
            Ok(Expr::Assign(name.clone(), Box::new(sexp_to_expr(value)?)))
        }
        "lambda" => {
            let [_, Sexp::List(params), body @ ..] = items else {
                return Err(err("(lambda (params...) body...) requires a parameter list"));
            };
            let mut names = Vec::with_capacity(params.len());
            for p in params {
                let Sexp::Sym(name) = p else {
                    return Err(err("lambda parameters must be symbols"));
                };
                names.push(name.clone());
            }
            Ok(Expr::Lambda(names, Box::new(parse_body(body)?)))
        }
        "define" => {
            let [_, Sexp::Sym(name), value] = items else {
                return Err(err("(define name value) requires a symbol and a value"));
            };
            Ok(Expr::Define(name.clone(), Box::new(sexp_to_expr(value)?)))
        }
        _ => parse_call(items),
    }
}

fn parse_body(forms: &[Sexp]) -> Result<Expr, ReaderError> {
    if forms.is_empty() {
        return Err(err("a body must contain at least one expression"));
    }
    if forms.len() == 1 {
        return sexp_to_expr(&forms[0]);
    }
    let exprs = forms.iter().map(sexp_to_expr).collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::Begin(exprs))
}

fn parse_call(items: &[Sexp]) -> Result<Expr, ReaderError> {
    let (callee, args) = items.split_first().ok_or_else(|| err("empty call form"))?;
    let callee = sexp_to_expr(callee)?;
    let args = args.iter().map(sexp_to_expr).collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::Call(Box::new(callee), args))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_integers_and_strings() {
        assert_eq!(read_one("42").unwrap(), Expr::Int(42));
        assert_eq!(read_one("-7").unwrap(), Expr::Int(-7));
        assert_eq!(read_one("\"hi\"").unwrap(), Expr::Str("hi".to_string()));
    }

    #[test]
    fn reads_global_prefixed_symbol() {
        assert_eq!(read_one("global:foo").unwrap(), Expr::GlobalVar("foo".to_string()));
    }

    #[test]
    fn reads_lambda_and_call() {
        let e = read_one("((lambda (x) x) 42)").unwrap();
        match e {
            Expr::Call(callee, args) => {
                assert_eq!(args, vec![Expr::Int(42)]);
                assert_eq!(*callee, Expr::Lambda(vec!["x".into()], Box::new(Expr::Var("x".into()))));
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn reads_let_with_multiple_bindings() {
        let e = read_one("(let ((x 1) (y 2)) (set! x y))").unwrap();
        match e {
            Expr::Let(bindings, body) => {
                assert_eq!(bindings.len(), 2);
                assert_eq!(bindings[0].0, "x");
                assert_eq!(*body, Expr::Assign("x".into(), Box::new(Expr::Var("y".into()))));
            }
            other => panic!("expected a let, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unterminated_list() {
        assert!(read_one("(if 1 2").is_err());
    }
}

//! Lua front-end.
//!
//! Parses the restricted Lua dialect emitted by protobuf descriptor generators
//! into an owned syntax tree. The grammar lives in `lua.pest`; this module turns
//! the pest parse into [`Statement`] and [`Expr`] values the reconstruction
//! engine can pattern-match on.
//!
//! The [`SyntaxSource`] trait is the seam between the engine and wherever trees
//! come from. [`LuaSourceLoader`] is the filesystem implementation.

mod loader;

use crate::error::{Error, Result};
use pest::iterators::Pair;
use parser::{LuaParser, Rule};
use pest::Parser as _;

pub use loader::{LuaSourceLoader, SyntaxSource, LUA_EXTENSION};

// The derive emits a `pub enum Rule`; keep it out of the public API
#[allow(unreachable_pub)]
mod parser {
    use pest_derive::Parser;

    #[derive(Parser)]
    #[grammar = "syntax/lua.pest"]
    pub(super) struct LuaParser;
}

/// One parsed Lua module
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxTree {
    /// Module identifier (file name without extension)
    pub module: String,
    /// File name the tree was parsed from
    pub source_name: String,
    /// Top-level statements in source order
    pub statements: Vec<Statement>,
}

impl SyntaxTree {
    /// Parses Lua source text.
    ///
    /// `source_name` is the file name; the module identifier is derived from it
    /// by stripping the `.lua` extension.
    pub fn parse(source_name: impl Into<String>, text: &str) -> Result<Self> {
        let source_name = source_name.into();
        let module = module_name(&source_name).to_string();

        let mut pairs = LuaParser::parse(Rule::chunk, text)
            .map_err(|e| Error::syntax(&source_name, e.to_string()))?;
        let chunk = pairs
            .next()
            .ok_or_else(|| Error::syntax(&source_name, "expected chunk"))?;

        let statements = chunk
            .into_inner()
            .filter(|p| p.as_rule() != Rule::EOI)
            .map(build_statement)
            .collect();

        Ok(Self {
            module,
            source_name,
            statements,
        })
    }
}

/// Strips a trailing `.lua` extension from a file name
pub fn module_name(source_name: &str) -> &str {
    source_name
        .strip_suffix(LUA_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(source_name)
}

/// A top-level statement with the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// 1-based line number
    pub line: usize,
    /// Statement shape
    pub kind: StatementKind,
}

/// Statement shapes of the dialect
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `local a, b = x, y`
    Local {
        /// Declared names
        names: Vec<String>,
        /// Initialisers, possibly fewer than names
        values: Vec<Expr>,
    },
    /// `t.a, t.b = x, y`
    Assign {
        /// Assignment targets
        targets: Vec<Expr>,
        /// Assigned values
        values: Vec<Expr>,
    },
    /// A bare call such as `module("foo_pb")`
    Call(Expr),
    /// `return x`
    Return(Vec<Expr>),
}

/// Field of a table constructor
#[derive(Debug, Clone, PartialEq)]
pub enum TableField {
    /// `{ x }`
    Positional(Expr),
    /// `{ name = x }`
    Named(String, Expr),
    /// `{ [k] = x }`
    Keyed(Expr, Expr),
}

/// Expressions of the dialect
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Expr {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Table(Vec<TableField>),
    Name(String),
    /// `base.name`
    Member { base: Box<Expr>, name: String },
    /// `base[key]`
    Index { base: Box<Expr>, key: Box<Expr> },
    /// `callee(args)`, `callee "s"` or `callee { .. }`
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `receiver:method(args)`
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    /// Unary minus
    Neg(Box<Expr>),
    Paren(Box<Expr>),
}

impl Expr {
    /// Returns the dotted name chain of a `a.b.c` expression
    pub fn path(&self) -> Option<Vec<&str>> {
        match self {
            Expr::Name(name) => Some(vec![name.as_str()]),
            Expr::Member { base, name } => {
                let mut path = base.path()?;
                path.push(name.as_str());
                Some(path)
            }
            Expr::Paren(inner) => inner.path(),
            _ => None,
        }
    }

    /// Returns the string value of a string literal
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Expr::Str(s) => Some(s),
            Expr::Paren(inner) => inner.as_str(),
            _ => None,
        }
    }

    /// Returns the value of a boolean literal
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Expr::Bool(b) => Some(*b),
            Expr::Paren(inner) => inner.as_bool(),
            _ => None,
        }
    }

    /// Evaluates an integer literal, folding unary minus and parentheses.
    ///
    /// Floats with an exact integer value are accepted, since Lua number
    /// literals do not distinguish the two.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Expr::Integer(n) => Some(*n),
            Expr::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Some(*f as i64),
            Expr::Neg(inner) => inner.as_integer()?.checked_neg(),
            Expr::Paren(inner) => inner.as_integer(),
            _ => None,
        }
    }

    /// Returns the elements of a table constructor whose fields are all positional
    pub fn as_list(&self) -> Option<Vec<&Expr>> {
        match self {
            Expr::Table(fields) => fields
                .iter()
                .map(|field| match field {
                    TableField::Positional(expr) => Some(expr),
                    _ => None,
                })
                .collect(),
            Expr::Paren(inner) => inner.as_list(),
            _ => None,
        }
    }

    /// Returns true for a table constructor with no fields
    pub fn is_empty_table(&self) -> bool {
        matches!(self, Expr::Table(fields) if fields.is_empty())
    }
}

fn build_statement(pair: Pair<'_, Rule>) -> Statement {
    let (line, _) = pair.as_span().start_pos().line_col();

    let kind = match pair.as_rule() {
        Rule::local_stat => {
            let mut names = Vec::new();
            let mut values = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::name_list => names = inner.into_inner().map(|n| n.as_str().to_string()).collect(),
                    Rule::expr_list => values = build_expr_list(inner),
                    _ => {}
                }
            }
            StatementKind::Local { names, values }
        }
        Rule::return_stat => {
            let values = pair
                .into_inner()
                .find(|p| p.as_rule() == Rule::expr_list)
                .map(build_expr_list)
                .unwrap_or_default();
            StatementKind::Return(values)
        }
        Rule::assign_stat => {
            let mut targets = Vec::new();
            let mut values = Vec::new();
            for inner in pair.into_inner() {
                match inner.as_rule() {
                    Rule::var_list => targets = inner.into_inner().map(build_suffixed).collect(),
                    Rule::expr_list => values = build_expr_list(inner),
                    _ => {}
                }
            }
            StatementKind::Assign { targets, values }
        }
        Rule::call_stat => {
            let call = pair
                .into_inner()
                .next()
                .map(build_suffixed)
                .unwrap_or(Expr::Nil);
            StatementKind::Call(call)
        }
        rule => unreachable!("statement rule {:?}", rule),
    };

    Statement { line, kind }
}

fn build_expr_list(pair: Pair<'_, Rule>) -> Vec<Expr> {
    pair.into_inner().map(build_expr).collect()
}

fn build_expr(pair: Pair<'_, Rule>) -> Expr {
    // `expr` wraps exactly one alternative
    let pair = if pair.as_rule() == Rule::expr {
        match pair.into_inner().next() {
            Some(inner) => inner,
            None => return Expr::Nil,
        }
    } else {
        pair
    };

    match pair.as_rule() {
        Rule::neg_expr => {
            let inner = pair.into_inner().next().map(build_expr).unwrap_or(Expr::Nil);
            Expr::Neg(Box::new(inner))
        }
        Rule::nil_lit => Expr::Nil,
        Rule::true_lit => Expr::Bool(true),
        Rule::false_lit => Expr::Bool(false),
        Rule::number => parse_number(pair.as_str()),
        Rule::string => Expr::Str(build_string(pair)),
        Rule::table => Expr::Table(pair.into_inner().map(build_table_field).collect()),
        Rule::suffixed_expr => build_suffixed(pair),
        Rule::paren_expr => {
            let inner = pair.into_inner().next().map(build_expr).unwrap_or(Expr::Nil);
            Expr::Paren(Box::new(inner))
        }
        rule => unreachable!("expression rule {:?}", rule),
    }
}

fn build_suffixed(pair: Pair<'_, Rule>) -> Expr {
    let mut inner = pair.into_inner();
    let mut expr = match inner.next() {
        Some(head) if head.as_rule() == Rule::name => Expr::Name(head.as_str().to_string()),
        Some(head) => build_expr(head),
        None => return Expr::Nil,
    };

    for suffix in inner {
        expr = match suffix.as_rule() {
            Rule::field_suffix => Expr::Member {
                base: Box::new(expr),
                name: suffix
                    .into_inner()
                    .next()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default(),
            },
            Rule::index_suffix => Expr::Index {
                base: Box::new(expr),
                key: Box::new(suffix.into_inner().next().map(build_expr).unwrap_or(Expr::Nil)),
            },
            Rule::method_suffix => {
                let mut parts = suffix.into_inner();
                let method = parts.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                Expr::MethodCall {
                    receiver: Box::new(expr),
                    method,
                    args: parts.flat_map(build_call_args).collect(),
                }
            }
            Rule::call_suffix => Expr::Call {
                callee: Box::new(expr),
                args: suffix.into_inner().flat_map(build_call_args).collect(),
            },
            rule => unreachable!("suffix rule {:?}", rule),
        };
    }

    expr
}

/// Call arguments are an expression list, a single string or a single table
fn build_call_args(pair: Pair<'_, Rule>) -> Vec<Expr> {
    match pair.as_rule() {
        Rule::expr_list => build_expr_list(pair),
        _ => vec![build_expr(pair)],
    }
}

fn build_table_field(pair: Pair<'_, Rule>) -> TableField {
    let rule = pair.as_rule();
    let mut inner = pair.into_inner();
    match rule {
        Rule::keyed_field => {
            let key = inner.next().map(build_expr).unwrap_or(Expr::Nil);
            let value = inner.next().map(build_expr).unwrap_or(Expr::Nil);
            TableField::Keyed(key, value)
        }
        Rule::named_field => {
            let name = inner.next().map(|p| p.as_str().to_string()).unwrap_or_default();
            let value = inner.next().map(build_expr).unwrap_or(Expr::Nil);
            TableField::Named(name, value)
        }
        _ => TableField::Positional(inner.next().map(build_expr).unwrap_or(Expr::Nil)),
    }
}

fn parse_number(text: &str) -> Expr {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        // Lua wraps oversized hex literals modulo 2^64
        return match u64::from_str_radix(hex, 16) {
            Ok(n) => Expr::Integer(n as i64),
            Err(_) => Expr::Float(f64::INFINITY),
        };
    }

    if !text.contains(|c: char| matches!(c, '.' | 'e' | 'E')) {
        if let Ok(n) = text.parse::<i64>() {
            return Expr::Integer(n);
        }
    }

    Expr::Float(text.parse().unwrap_or(f64::NAN))
}

fn build_string(pair: Pair<'_, Rule>) -> String {
    let Some(content) = pair.into_inner().next() else {
        return String::new();
    };

    match content.as_rule() {
        Rule::long_content => {
            // A newline directly after the opening bracket is not part of the string
            let text = content.as_str();
            text.strip_prefix("\r\n")
                .or_else(|| text.strip_prefix('\n'))
                .unwrap_or(text)
                .to_string()
        }
        _ => unescape(content.as_str()),
    }
}

/// Decodes Lua escape sequences in a quoted string body
fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }

        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('a') => result.push('\u{07}'),
            Some('b') => result.push('\u{08}'),
            Some('f') => result.push('\u{0c}'),
            Some('v') => result.push('\u{0b}'),
            Some('x') => {
                let hex: String = (0..2).filter_map(|_| chars.next_if(|c| c.is_ascii_hexdigit())).collect();
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(char::from(byte));
                }
            }
            Some(d) if d.is_ascii_digit() => {
                let mut digits = d.to_string();
                while digits.len() < 3 {
                    match chars.next_if(|c| c.is_ascii_digit()) {
                        Some(next) => digits.push(next),
                        None => break,
                    }
                }
                if let Ok(byte) = digits.parse::<u8>() {
                    result.push(char::from(byte));
                }
            }
            Some(other) => result.push(other),
            None => result.push('\\'),
        }
    }

    result
}

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::parser::{BinaryOp, Node, NodeKind};
use super::{Field, FieldType, FilterError, Fields, Scope, Value};

#[derive(Debug)]
pub(super) enum Expr {
    Const(Const),
    Field(&'static str),
    Has(&'static str),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(BinaryOp, Box<Expr>, Box<Expr>),
    Text(TextOp, Box<Expr>, Box<Expr>),
    Matches(Box<Expr>, Regex),
}

#[derive(Debug)]
pub(super) enum Const {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Timestamp(DateTime<Utc>),
    Enum(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub(super) enum TextOp {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Type {
    Null,
    Bool,
    Int,
    String,
    Timestamp,
    Enum(&'static [&'static str]),
    /// A bare enum constant such as `STORY`.
    Constant(&'static str),
}

impl Type {
    fn of(ty: FieldType) -> Self {
        match ty {
            FieldType::Bool => Self::Bool,
            FieldType::Int => Self::Int,
            FieldType::String => Self::String,
            FieldType::Timestamp => Self::Timestamp,
            FieldType::Enum(variants) => Self::Enum(variants),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::String => "string",
            Self::Timestamp => "timestamp",
            Self::Enum(_) | Self::Constant(_) => "enum",
        }
    }
}

struct Typed {
    expr: Expr,
    ty: Type,
    optional: bool,
}

impl Typed {
    fn new(expr: Expr, ty: Type) -> Self {
        Self {
            expr,
            ty,
            optional: false,
        }
    }
}

pub(super) fn compile(scope: &Scope, node: Node) -> Result<Expr, FilterError> {
    let pos = node.pos;
    let typed = check(scope, node)?;
    if typed.ty != Type::Bool {
        return Err(FilterError::new(
            format!("filter must evaluate to bool, not {}", typed.ty.name()),
            pos,
        ));
    }
    Ok(typed.expr)
}

fn check(scope: &Scope, node: Node) -> Result<Typed, FilterError> {
    let pos = node.pos;
    match node.kind {
        NodeKind::Null => Ok(Typed::new(Expr::Const(Const::Null), Type::Null)),
        NodeKind::Bool(value) => Ok(Typed::new(Expr::Const(Const::Bool(value)), Type::Bool)),
        NodeKind::Int(value) => Ok(Typed::new(Expr::Const(Const::Int(value)), Type::Int)),
        NodeKind::Str(value) => Ok(Typed::new(Expr::Const(Const::Str(value)), Type::String)),
        NodeKind::Ident(name) => {
            if name == "this" {
                return Err(FilterError::new("`this` must be followed by a field", pos));
            }
            let constant = scope
                .constants
                .get(name.as_str())
                .copied()
                .ok_or_else(|| FilterError::new(format!("undeclared reference to {name:?}"), pos))?;
            Ok(Typed::new(
                Expr::Const(Const::Enum(constant)),
                Type::Constant(constant),
            ))
        }
        NodeKind::Select(target, field) => select(scope, *target, &field, pos),
        NodeKind::Call {
            target: None,
            function,
            args,
        } => global_call(scope, &function, args, pos),
        NodeKind::Call {
            target: Some(target),
            function,
            args,
        } => method_call(scope, *target, &function, args, pos),
        NodeKind::Not(operand) => {
            let operand = expect_bool(scope, *operand, "!")?;
            Ok(Typed::new(Expr::Not(Box::new(operand)), Type::Bool))
        }
        NodeKind::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
            let lhs = Box::new(expect_bool(scope, *lhs, op.symbol())?);
            let rhs = Box::new(expect_bool(scope, *rhs, op.symbol())?);
            let expr = if op == BinaryOp::And {
                Expr::And(lhs, rhs)
            } else {
                Expr::Or(lhs, rhs)
            };
            Ok(Typed::new(expr, Type::Bool))
        }
        NodeKind::Binary(op, lhs, rhs) => {
            let lhs = check(scope, *lhs)?;
            let rhs = check(scope, *rhs)?;
            comparison(op, lhs, rhs, pos)
        }
    }
}

fn expect_bool(scope: &Scope, node: Node, operator: &str) -> Result<Expr, FilterError> {
    let pos = node.pos;
    let typed = check(scope, node)?;
    if typed.ty != Type::Bool {
        return Err(FilterError::new(
            format!("operator {operator} expects bool, not {}", typed.ty.name()),
            pos,
        ));
    }
    Ok(typed.expr)
}

fn lookup(
    scope: &Scope,
    target: &Node,
    name: &str,
    pos: usize,
) -> Result<&'static Field, FilterError> {
    if !matches!(&target.kind, NodeKind::Ident(ident) if ident == "this") {
        return Err(FilterError::new(
            "fields can only be selected from `this`",
            target.pos,
        ));
    }
    scope
        .fields
        .get(name)
        .copied()
        .ok_or_else(|| FilterError::new(format!("no such field {name:?}"), pos))
}

fn select(scope: &Scope, target: Node, name: &str, pos: usize) -> Result<Typed, FilterError> {
    let field = lookup(scope, &target, name, pos)?;
    Ok(Typed {
        expr: Expr::Field(field.name),
        ty: Type::of(field.ty),
        optional: field.optional,
    })
}

fn global_call(
    scope: &Scope,
    function: &str,
    mut args: Vec<Node>,
    pos: usize,
) -> Result<Typed, FilterError> {
    if args.len() != 1 {
        return Err(FilterError::new(
            format!("{function}() takes exactly one argument"),
            pos,
        ));
    }
    let arg = args.remove(0);
    match function {
        "has" => {
            let NodeKind::Select(target, field) = arg.kind else {
                return Err(FilterError::new("has() expects a field selection", arg.pos));
            };
            let field = lookup(scope, &target, &field, arg.pos)?;
            Ok(Typed::new(Expr::Has(field.name), Type::Bool))
        }
        "timestamp" => {
            let NodeKind::Str(text) = arg.kind else {
                return Err(FilterError::new(
                    "timestamp() expects a string literal",
                    arg.pos,
                ));
            };
            let time = DateTime::parse_from_rfc3339(&text)
                .map_err(|err| FilterError::new(format!("invalid timestamp {text:?}: {err}"), arg.pos))?
                .with_timezone(&Utc);
            Ok(Typed::new(Expr::Const(Const::Timestamp(time)), Type::Timestamp))
        }
        other => Err(FilterError::new(format!("unknown function {other}()"), pos)),
    }
}

fn method_call(
    scope: &Scope,
    target: Node,
    method: &str,
    mut args: Vec<Node>,
    pos: usize,
) -> Result<Typed, FilterError> {
    let op = match method {
        "contains" => Some(TextOp::Contains),
        "startsWith" => Some(TextOp::StartsWith),
        "endsWith" => Some(TextOp::EndsWith),
        "matches" => None,
        other => return Err(FilterError::new(format!("unknown method {other}()"), pos)),
    };
    if args.len() != 1 {
        return Err(FilterError::new(
            format!("{method}() takes exactly one argument"),
            pos,
        ));
    }
    let receiver = check(scope, target)?;
    if receiver.ty != Type::String {
        return Err(FilterError::new(
            format!("{method}() is only defined on strings, not {}", receiver.ty.name()),
            pos,
        ));
    }
    let arg = args.remove(0);
    let arg_pos = arg.pos;

    let Some(op) = op else {
        let NodeKind::Str(pattern) = arg.kind else {
            return Err(FilterError::new("matches() expects a string literal", arg_pos));
        };
        let regex = Regex::new(&pattern)
            .map_err(|err| FilterError::new(format!("invalid pattern: {err}"), arg_pos))?;
        return Ok(Typed::new(
            Expr::Matches(Box::new(receiver.expr), regex),
            Type::Bool,
        ));
    };

    let arg = check(scope, arg)?;
    if arg.ty != Type::String {
        return Err(FilterError::new(
            format!("{method}() expects a string argument, not {}", arg.ty.name()),
            arg_pos,
        ));
    }
    Ok(Typed::new(
        Expr::Text(op, Box::new(receiver.expr), Box::new(arg.expr)),
        Type::Bool,
    ))
}

fn comparison(op: BinaryOp, lhs: Typed, rhs: Typed, pos: usize) -> Result<Typed, FilterError> {
    let mismatch = |lhs: Type, rhs: Type| {
        FilterError::new(
            format!(
                "cannot compare {} with {} using {}",
                lhs.name(),
                rhs.name(),
                op.symbol()
            ),
            pos,
        )
    };

    let (lhs, rhs) = match op {
        BinaryOp::Eq | BinaryOp::Ne => equatable(lhs, rhs).map_err(|(l, r)| mismatch(l, r))?,
        _ => {
            let ordered = matches!(lhs.ty, Type::Int | Type::String | Type::Timestamp);
            if !ordered || lhs.ty != rhs.ty {
                return Err(mismatch(lhs.ty, rhs.ty));
            }
            (lhs.expr, rhs.expr)
        }
    };
    Ok(Typed::new(
        Expr::Compare(op, Box::new(lhs), Box::new(rhs)),
        Type::Bool,
    ))
}

/// Unifies the operands of `==`/`!=`, rewriting string literals compared
/// against an enum field into enum constants.
fn equatable(lhs: Typed, rhs: Typed) -> Result<(Expr, Expr), (Type, Type)> {
    match (lhs.ty, rhs.ty) {
        (Type::Enum(variants), Type::Constant(name)) if variants.contains(&name) => {
            Ok((lhs.expr, rhs.expr))
        }
        (Type::Constant(name), Type::Enum(variants)) if variants.contains(&name) => {
            Ok((lhs.expr, rhs.expr))
        }
        (Type::Enum(variants), Type::String) => {
            let constant = enum_literal(&rhs.expr, variants).ok_or((lhs.ty, rhs.ty))?;
            Ok((lhs.expr, Expr::Const(Const::Enum(constant))))
        }
        (Type::String, Type::Enum(variants)) => {
            let constant = enum_literal(&lhs.expr, variants).ok_or((lhs.ty, rhs.ty))?;
            Ok((Expr::Const(Const::Enum(constant)), rhs.expr))
        }
        (Type::Null, Type::Null) => Ok((lhs.expr, rhs.expr)),
        (Type::Null, _) if rhs.optional => Ok((lhs.expr, rhs.expr)),
        (_, Type::Null) if lhs.optional => Ok((lhs.expr, rhs.expr)),
        (l, r) if l == r && l != Type::Null => Ok((lhs.expr, rhs.expr)),
        (l, r) => Err((l, r)),
    }
}

fn enum_literal(expr: &Expr, variants: &'static [&'static str]) -> Option<&'static str> {
    let Expr::Const(Const::Str(text)) = expr else {
        return None;
    };
    variants.iter().copied().find(|variant| variant == text)
}

impl Const {
    fn value(&self) -> Value<'_> {
        match self {
            Self::Null => Value::Null,
            Self::Bool(value) => Value::Bool(*value),
            Self::Int(value) => Value::Int(*value),
            Self::Str(value) => Value::Str(value),
            Self::Timestamp(value) => Value::Timestamp(*value),
            Self::Enum(value) => Value::Enum(value),
        }
    }
}

impl Expr {
    pub(super) fn test(&self, item: &dyn Fields) -> bool {
        matches!(self.eval(item), Value::Bool(true))
    }

    fn eval<'a>(&'a self, item: &'a dyn Fields) -> Value<'a> {
        match self {
            Self::Const(constant) => constant.value(),
            Self::Field(name) => item.field(name),
            Self::Has(name) => Value::Bool(item.field(name) != Value::Null),
            Self::Not(operand) => Value::Bool(!operand.test(item)),
            Self::And(lhs, rhs) => Value::Bool(lhs.test(item) && rhs.test(item)),
            Self::Or(lhs, rhs) => Value::Bool(lhs.test(item) || rhs.test(item)),
            Self::Compare(op, lhs, rhs) => {
                Value::Bool(compare(*op, &lhs.eval(item), &rhs.eval(item)))
            }
            Self::Text(op, lhs, rhs) => match (lhs.eval(item), rhs.eval(item)) {
                (Value::Str(haystack), Value::Str(needle)) => Value::Bool(match op {
                    TextOp::Contains => haystack.contains(needle),
                    TextOp::StartsWith => haystack.starts_with(needle),
                    TextOp::EndsWith => haystack.ends_with(needle),
                }),
                _ => Value::Bool(false),
            },
            Self::Matches(operand, regex) => match operand.eval(item) {
                Value::Str(text) => Value::Bool(regex.is_match(text)),
                _ => Value::Bool(false),
            },
        }
    }
}

fn compare(op: BinaryOp, lhs: &Value<'_>, rhs: &Value<'_>) -> bool {
    match op {
        BinaryOp::Eq => lhs == rhs,
        BinaryOp::Ne => lhs != rhs,
        _ => {
            let Some(ordering) = order(lhs, rhs) else {
                return false;
            };
            match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                _ => false,
            }
        }
    }
}

fn order(lhs: &Value<'_>, rhs: &Value<'_>) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

//! AST for the supported SELECT dialect.

use std::fmt;

use fsq_common::{ArithOp, CompareOp, Value};
use serde::{Deserialize, Serialize};

/// A column reference, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Table alias qualifier, when written as `alias.column`.
    pub qualifier: Option<String>,
    /// Column name.
    pub name: String,
}

impl ColumnRef {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            qualifier: None,
            name: name.into(),
        }
    }

    /// Parses `alias.column` by splitting on the last dot.
    pub fn parse(word: &str) -> Self {
        match word.rsplit_once('.') {
            Some((q, n)) if !q.is_empty() && !n.is_empty() => Self {
                qualifier: Some(q.to_string()),
                name: n.to_string(),
            },
            _ => Self::bare(word),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Binary operators in expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Compare(CompareOp),
    Arith(ArithOp),
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Compare(op) => f.write_str(op.as_str()),
            BinaryOp::Arith(op) => f.write_str(op.as_str()),
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        }
    }
}

/// Argument of an aggregate call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateArg {
    /// `COUNT(*)`.
    Star,
    /// A column argument.
    Column(ColumnRef),
}

/// An aggregate call such as `AVG(v)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCall {
    pub func: AggregateFunc,
    pub arg: AggregateArg,
}

impl AggregateCall {
    /// Canonical SQL text, used as the default output column name.
    pub fn canonical_name(&self) -> String {
        match &self.arg {
            AggregateArg::Star => format!("{}(*)", self.func.as_str()),
            AggregateArg::Column(c) => format!("{}({})", self.func.as_str(), c),
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Binary {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    Aggregate(AggregateCall),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(c) => write!(f, "{c}"),
            Expr::Literal(v) => match v {
                Value::Str(s) => write!(f, "'{s}'"),
                other => write!(f, "{other}"),
            },
            Expr::Binary { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::And(a, b) => write!(f, "{a} AND {b}"),
            Expr::Or(a, b) => write!(f, "({a} OR {b})"),
            Expr::Not(e) => write!(f, "NOT ({e})"),
            Expr::IsNull(e) => write!(f, "{e} IS NULL"),
            Expr::IsNotNull(e) => write!(f, "{e} IS NOT NULL"),
            Expr::Aggregate(a) => f.write_str(&a.canonical_name()),
        }
    }
}

/// One item of the SELECT list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectItem {
    /// `SELECT *`.
    Wildcard,
    /// An expression with an optional `AS` alias.
    Expr { expr: Expr, alias: Option<String> },
}

impl SelectItem {
    /// Output column name: the alias if present, else the display form of
    /// the expression (bare columns keep their unqualified name).
    pub fn output_name(&self) -> Option<String> {
        match self {
            SelectItem::Wildcard => None,
            SelectItem::Expr { expr, alias } => Some(match (alias, expr) {
                (Some(a), _) => a.clone(),
                (None, Expr::Column(c)) => c.name.clone(),
                (None, Expr::Aggregate(a)) => a.canonical_name(),
                (None, e) => e.to_string(),
            }),
        }
    }
}

/// A FROM or JOIN source: a locator (quoted path/URL) or bare table word,
/// plus an optional alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Locator string exactly as written (fragment included).
    pub locator: String,
    /// Table alias, written with or without `AS`.
    pub alias: Option<String>,
    /// Whether the source was written as a quoted path.
    pub quoted: bool,
}

impl SourceRef {
    /// Name this source binds to in the query: the alias when present,
    /// else the locator text.
    pub fn binding(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.locator)
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    /// Comma-form `FROM a, b`.
    Cross,
}

impl JoinKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
            JoinKind::Cross => "CROSS",
        }
    }
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub source: SourceRef,
    /// `ON` expression; `None` for the comma cross-join form.
    pub on: Option<Expr>,
}

/// One ORDER BY key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: ColumnRef,
    pub ascending: bool,
}

/// A parsed SELECT statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStatement {
    pub projection: Vec<SelectItem>,
    pub from: SourceRef,
    pub joins: Vec<JoinClause>,
    pub selection: Option<Expr>,
    pub group_by: Vec<ColumnRef>,
    pub order_by: Vec<SortKey>,
    pub limit: Option<usize>,
}

impl SelectStatement {
    /// All aggregate calls appearing in the SELECT list, in order.
    pub fn aggregates(&self) -> Vec<&AggregateCall> {
        let mut out = Vec::new();
        for item in &self.projection {
            if let SelectItem::Expr { expr, .. } = item {
                collect_aggregates(expr, &mut out);
            }
        }
        out
    }

    /// True when the statement aggregates (explicitly or groupless).
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregates().is_empty()
    }
}

fn collect_aggregates<'a>(expr: &'a Expr, out: &mut Vec<&'a AggregateCall>) {
    match expr {
        Expr::Aggregate(a) => out.push(a),
        Expr::Binary { left, right, .. } => {
            collect_aggregates(left, out);
            collect_aggregates(right, out);
        }
        Expr::And(a, b) | Expr::Or(a, b) => {
            collect_aggregates(a, out);
            collect_aggregates(b, out);
        }
        Expr::Not(e) | Expr::IsNull(e) | Expr::IsNotNull(e) => collect_aggregates(e, out),
        Expr::Column(_) | Expr::Literal(_) => {}
    }
}

//! Recursive-descent parser for the SELECT dialect.
//!
//! Grammar (informal):
//! ```text
//! select      := "SELECT" projection "FROM" source_list
//!                [join_clause]* [where] [group_by] [order_by] [limit]
//! projection  := "*" | expr ("AS" ident)? ("," expr ("AS" ident)?)*
//! source_list := source ("," source)*          -- comma form = CROSS JOIN
//! source      := (word | quoted_path) [alias]
//! join_clause := ("INNER"|"LEFT"|"RIGHT"|"FULL")? "JOIN" source "ON" expr
//! ```

use fsq_common::{ArithOp, CompareOp, FsqError, Result, Value};

use crate::ast::{
    AggregateArg, AggregateCall, AggregateFunc, BinaryOp, ColumnRef, Expr, JoinClause, JoinKind,
    SelectItem, SelectStatement, SortKey, SourceRef,
};
use crate::lexer::{parse_error, tokenize, Symbol, Token, TokenKind};

/// Words that terminate alias positions.
const KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP", "ORDER", "LIMIT", "JOIN", "INNER", "LEFT", "RIGHT",
    "FULL", "CROSS", "ON", "AS", "AND", "OR", "NOT", "IS", "NULL", "ASC", "DESC", "BY",
];

/// Parses one SELECT statement; trailing tokens are an error.
pub fn parse(sql: &str) -> Result<SelectStatement> {
    let tokens = tokenize(sql)?;
    let mut p = Parser {
        sql,
        tokens,
        pos: 0,
    };
    let stmt = p.parse_select()?;
    if let Some(t) = p.current() {
        let offset = t.offset;
        return Err(p.error(offset, "unexpected trailing input"));
    }
    Ok(stmt)
}

struct Parser<'a> {
    sql: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> FsqError {
        parse_error(self.sql, offset, message)
    }

    fn error_here(&self, message: impl Into<String>) -> FsqError {
        let offset = self
            .current()
            .map(|t| t.offset)
            .unwrap_or_else(|| self.sql.len());
        self.error(offset, message)
    }

    fn is_word(&self, kw: &str) -> bool {
        matches!(self.current(), Some(Token { kind: TokenKind::Word(w), .. }) if w.eq_ignore_ascii_case(kw))
    }

    fn expect_word(&mut self, kw: &str) -> Result<()> {
        if self.is_word(kw) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error_here(format!("expected `{kw}`")))
        }
    }

    fn eat_word(&mut self, kw: &str) -> bool {
        if self.is_word(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn is_sym(&self, s: Symbol) -> bool {
        matches!(self.current(), Some(Token { kind: TokenKind::Sym(sym), .. }) if *sym == s)
    }

    fn eat_sym(&mut self, s: Symbol) -> bool {
        if self.is_sym(s) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, s: Symbol) -> Result<()> {
        if self.eat_sym(s) {
            Ok(())
        } else {
            Err(self.error_here(format!("expected `{}`", s.as_str())))
        }
    }

    fn parse_select(&mut self) -> Result<SelectStatement> {
        self.expect_word("SELECT")?;
        let projection = self.parse_projection()?;
        self.expect_word("FROM")?;
        let from = self.parse_source()?;
        let mut joins = Vec::new();

        // Comma-separated FROM list is implicit cross join.
        while self.eat_sym(Symbol::Comma) {
            joins.push(JoinClause {
                kind: JoinKind::Cross,
                source: self.parse_source()?,
                on: None,
            });
        }
        while let Some(join) = self.parse_join()? {
            joins.push(join);
        }

        let selection = if self.eat_word("WHERE") {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let mut group_by = Vec::new();
        if self.eat_word("GROUP") {
            self.expect_word("BY")?;
            loop {
                group_by.push(self.parse_column_ref()?);
                if !self.eat_sym(Symbol::Comma) {
                    break;
                }
            }
        }

        let mut order_by = Vec::new();
        if self.eat_word("ORDER") {
            self.expect_word("BY")?;
            loop {
                let column = self.parse_column_ref()?;
                let ascending = if self.eat_word("DESC") {
                    false
                } else {
                    self.eat_word("ASC");
                    true
                };
                order_by.push(SortKey { column, ascending });
                if !self.eat_sym(Symbol::Comma) {
                    break;
                }
            }
        }

        let limit = if self.eat_word("LIMIT") {
            Some(self.parse_limit()?)
        } else {
            None
        };

        Ok(SelectStatement {
            projection,
            from,
            joins,
            selection,
            group_by,
            order_by,
            limit,
        })
    }

    fn parse_projection(&mut self) -> Result<Vec<SelectItem>> {
        if self.eat_sym(Symbol::Star) {
            return Ok(vec![SelectItem::Wildcard]);
        }
        let mut items = Vec::new();
        loop {
            let expr = self.parse_expr()?;
            let alias = if self.eat_word("AS") {
                Some(self.parse_bare_word()?)
            } else {
                None
            };
            items.push(SelectItem::Expr { expr, alias });
            if !self.eat_sym(Symbol::Comma) {
                break;
            }
        }
        Ok(items)
    }

    fn parse_source(&mut self) -> Result<SourceRef> {
        let (locator, quoted) = match self.advance() {
            Some(Token { kind: TokenKind::StringLit(s), .. }) => (s, true),
            Some(Token { kind: TokenKind::Word(w), .. }) => (w, false),
            Some(Token { offset, .. }) => {
                return Err(self.error(offset, "expected a table name or quoted path"))
            }
            None => return Err(self.error_here("expected a table name or quoted path")),
        };
        let alias = if self.eat_word("AS") {
            Some(self.parse_bare_word()?)
        } else if let Some(Token { kind: TokenKind::Word(w), .. }) = self.current() {
            if KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)) {
                None
            } else {
                let w = w.clone();
                self.pos += 1;
                Some(w)
            }
        } else {
            None
        };
        Ok(SourceRef {
            locator,
            alias,
            quoted,
        })
    }

    fn parse_join(&mut self) -> Result<Option<JoinClause>> {
        let kind = if self.is_word("JOIN") {
            JoinKind::Inner
        } else if self.is_word("INNER") {
            JoinKind::Inner
        } else if self.is_word("LEFT") {
            JoinKind::Left
        } else if self.is_word("RIGHT") {
            JoinKind::Right
        } else if self.is_word("FULL") {
            JoinKind::Full
        } else {
            return Ok(None);
        };
        if !self.eat_word("JOIN") {
            self.pos += 1; // the kind word
            self.eat_word("OUTER");
            self.expect_word("JOIN")?;
        }
        let source = self.parse_source()?;
        self.expect_word("ON")?;
        let on = self.parse_expr()?;
        Ok(Some(JoinClause {
            kind,
            source,
            on: Some(on),
        }))
    }

    fn parse_limit(&mut self) -> Result<usize> {
        match self.advance() {
            Some(Token { kind: TokenKind::Number(n), offset }) => n
                .parse::<usize>()
                .map_err(|_| self.error(offset, format!("LIMIT must be a non-negative integer, got `{n}`"))),
            Some(Token { offset, .. }) => {
                Err(self.error(offset, "LIMIT must be a non-negative integer"))
            }
            None => Err(self.error_here("expected a LIMIT value")),
        }
    }

    fn parse_bare_word(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token { kind: TokenKind::Word(w), .. }) => Ok(w),
            Some(Token { offset, .. }) => Err(self.error(offset, "expected an identifier")),
            None => Err(self.error_here("expected an identifier")),
        }
    }

    fn parse_column_ref(&mut self) -> Result<ColumnRef> {
        let word = self.parse_bare_word()?;
        Ok(ColumnRef::parse(&word))
    }

    // Expression precedence: OR < AND < NOT < comparison/IS < additive
    // < multiplicative < primary.
    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.eat_word("OR") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_word("AND") {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr> {
        if self.eat_word("NOT") {
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;

        if self.eat_word("IS") {
            let negated = self.eat_word("NOT");
            self.expect_word("NULL")?;
            return Ok(if negated {
                Expr::IsNotNull(Box::new(left))
            } else {
                Expr::IsNull(Box::new(left))
            });
        }

        let op = match self.current() {
            Some(Token { kind: TokenKind::Sym(Symbol::Eq), .. }) => CompareOp::Eq,
            Some(Token { kind: TokenKind::Sym(Symbol::NotEq), .. }) => CompareOp::NotEq,
            Some(Token { kind: TokenKind::Sym(Symbol::Lt), .. }) => CompareOp::Lt,
            Some(Token { kind: TokenKind::Sym(Symbol::LtEq), .. }) => CompareOp::LtEq,
            Some(Token { kind: TokenKind::Sym(Symbol::Gt), .. }) => CompareOp::Gt,
            Some(Token { kind: TokenKind::Sym(Symbol::GtEq), .. }) => CompareOp::GtEq,
            _ => return Ok(left),
        };
        self.pos += 1;
        let right = self.parse_additive()?;
        Ok(Expr::Binary {
            left: Box::new(left),
            op: BinaryOp::Compare(op),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_sym(Symbol::Plus) {
                ArithOp::Add
            } else if self.eat_sym(Symbol::Minus) {
                ArithOp::Sub
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::Arith(op),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_primary()?;
        loop {
            let op = if self.eat_sym(Symbol::Star) {
                ArithOp::Mul
            } else if self.eat_sym(Symbol::Slash) {
                ArithOp::Div
            } else {
                return Ok(left);
            };
            let right = self.parse_primary()?;
            left = Expr::Binary {
                left: Box::new(left),
                op: BinaryOp::Arith(op),
                right: Box::new(right),
            };
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        if self.eat_sym(Symbol::LParen) {
            let inner = self.parse_expr()?;
            self.expect_sym(Symbol::RParen)?;
            return Ok(inner);
        }
        if self.eat_sym(Symbol::Minus) {
            // Unary minus folds into the literal where possible.
            let inner = self.parse_primary()?;
            return match inner {
                Expr::Literal(Value::Integer(i)) => Ok(Expr::Literal(Value::Integer(-i))),
                Expr::Literal(Value::Float(f)) => Ok(Expr::Literal(Value::Float(-f))),
                Expr::Literal(Value::Decimal(d)) => Ok(Expr::Literal(Value::Decimal(-d))),
                other => Ok(Expr::Binary {
                    left: Box::new(Expr::Literal(Value::Integer(0))),
                    op: BinaryOp::Arith(ArithOp::Sub),
                    right: Box::new(other),
                }),
            };
        }
        match self.advance() {
            Some(Token { kind: TokenKind::Number(n), offset }) => {
                let v = fsq_common::infer_value_from_string(&n);
                match v {
                    Value::Integer(_) | Value::Float(_) | Value::Decimal(_) => Ok(Expr::Literal(v)),
                    _ => Err(self.error(offset, format!("invalid numeric literal `{n}`"))),
                }
            }
            Some(Token { kind: TokenKind::StringLit(s), .. }) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token { kind: TokenKind::Word(w), offset }) => {
                if w.eq_ignore_ascii_case("NULL") {
                    return Ok(Expr::Literal(Value::Null));
                }
                if w.eq_ignore_ascii_case("TRUE") {
                    return Ok(Expr::Literal(Value::Bool(true)));
                }
                if w.eq_ignore_ascii_case("FALSE") {
                    return Ok(Expr::Literal(Value::Bool(false)));
                }
                if let Some(func) = aggregate_func(&w) {
                    if matches!(self.current(), Some(Token { kind: TokenKind::Sym(Symbol::LParen), .. })) {
                        return self.parse_aggregate_call(func);
                    }
                }
                if KEYWORDS.iter().any(|k| w.eq_ignore_ascii_case(k)) {
                    return Err(self.error(offset, format!("unexpected keyword `{w}`")));
                }
                Ok(Expr::Column(ColumnRef::parse(&w)))
            }
            Some(Token { offset, .. }) => Err(self.error(offset, "expected an expression")),
            None => Err(self.error_here("expected an expression")),
        }
    }

    fn parse_aggregate_call(&mut self, func: AggregateFunc) -> Result<Expr> {
        self.expect_sym(Symbol::LParen)?;
        let arg = if self.eat_sym(Symbol::Star) {
            if func != AggregateFunc::Count {
                return Err(self.error_here(format!("`*` is only valid in COUNT, not {}", func.as_str())));
            }
            AggregateArg::Star
        } else {
            AggregateArg::Column(self.parse_column_ref()?)
        };
        self.expect_sym(Symbol::RParen)?;
        Ok(Expr::Aggregate(AggregateCall { func, arg }))
    }
}

fn aggregate_func(word: &str) -> Option<AggregateFunc> {
    let w = word.to_ascii_uppercase();
    match w.as_str() {
        "COUNT" => Some(AggregateFunc::Count),
        "SUM" => Some(AggregateFunc::Sum),
        "AVG" => Some(AggregateFunc::Avg),
        "MIN" => Some(AggregateFunc::Min),
        "MAX" => Some(AggregateFunc::Max),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filter_project_order_limit() {
        let stmt =
            parse("SELECT name, age FROM 'e.csv' WHERE age >= 25 ORDER BY name DESC LIMIT 10")
                .unwrap();
        assert_eq!(stmt.projection.len(), 2);
        assert_eq!(stmt.from.locator, "e.csv");
        assert!(stmt.from.quoted);
        assert!(stmt.selection.is_some());
        assert_eq!(stmt.order_by.len(), 1);
        assert!(!stmt.order_by[0].ascending);
        assert_eq!(stmt.limit, Some(10));
    }

    #[test]
    fn parses_aliases_with_and_without_as() {
        let stmt = parse("SELECT u.name FROM 'u.csv' u LEFT JOIN 'o.csv' AS o ON u.id = o.uid")
            .unwrap();
        assert_eq!(stmt.from.alias.as_deref(), Some("u"));
        assert_eq!(stmt.joins.len(), 1);
        assert_eq!(stmt.joins[0].kind, JoinKind::Left);
        assert_eq!(stmt.joins[0].source.alias.as_deref(), Some("o"));
    }

    #[test]
    fn bare_join_defaults_to_inner() {
        let stmt = parse("SELECT * FROM a JOIN b ON a.id = b.id").unwrap();
        assert_eq!(stmt.joins[0].kind, JoinKind::Inner);
    }

    #[test]
    fn comma_sources_become_cross_joins() {
        let stmt = parse("SELECT * FROM a, b, c").unwrap();
        assert_eq!(stmt.joins.len(), 2);
        assert!(stmt.joins.iter().all(|j| j.kind == JoinKind::Cross));
        assert!(stmt.joins.iter().all(|j| j.on.is_none()));
    }

    #[test]
    fn boolean_operators_nest_with_precedence() {
        let stmt = parse("SELECT * FROM t WHERE a = 1 OR b = 2 AND NOT c = 3").unwrap();
        match stmt.selection.unwrap() {
            Expr::Or(_, right) => match *right {
                Expr::And(_, not_side) => assert!(matches!(*not_side, Expr::Not(_))),
                other => panic!("expected AND under OR, got {other:?}"),
            },
            other => panic!("expected OR at top, got {other:?}"),
        }
    }

    #[test]
    fn is_null_and_is_not_null() {
        let stmt = parse("SELECT * FROM t WHERE a IS NULL AND b IS NOT NULL").unwrap();
        match stmt.selection.unwrap() {
            Expr::And(a, b) => {
                assert!(matches!(*a, Expr::IsNull(_)));
                assert!(matches!(*b, Expr::IsNotNull(_)));
            }
            other => panic!("expected AND, got {other:?}"),
        }
    }

    #[test]
    fn aggregates_with_aliases() {
        let stmt = parse("SELECT k, AVG(v) AS mean, COUNT(*) FROM 's.csv' GROUP BY k").unwrap();
        let aggs = stmt.aggregates();
        assert_eq!(aggs.len(), 2);
        assert_eq!(stmt.projection[1].output_name().unwrap(), "mean");
        assert_eq!(stmt.projection[2].output_name().unwrap(), "COUNT(*)");
    }

    #[test]
    fn count_star_only() {
        let err = parse("SELECT SUM(*) FROM t").unwrap_err();
        assert!(err.to_string().contains("COUNT"));
    }

    #[test]
    fn errors_carry_offset_and_snippet() {
        let err = parse("SELECT name FRM 'e.csv'").unwrap_err();
        match err {
            FsqError::Parse { offset, snippet, .. } => {
                assert_eq!(offset, 12);
                assert!(snippet.contains("FRM"));
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn no_partial_ast_on_trailing_tokens() {
        assert!(parse("SELECT * FROM t extra nonsense, here").is_err());
    }

    #[test]
    fn negative_literals_fold() {
        let stmt = parse("SELECT * FROM t WHERE delta > -4").unwrap();
        match stmt.selection.unwrap() {
            Expr::Binary { right, .. } => {
                assert_eq!(*right, Expr::Literal(Value::Integer(-4)));
            }
            other => panic!("expected comparison, got {other:?}"),
        }
    }

    #[test]
    fn full_outer_join_with_optional_outer_word() {
        let stmt = parse("SELECT * FROM a FULL OUTER JOIN b ON a.k = b.k").unwrap();
        assert_eq!(stmt.joins[0].kind, JoinKind::Full);
        let stmt = parse("SELECT * FROM a FULL JOIN b ON a.k = b.k").unwrap();
        assert_eq!(stmt.joins[0].kind, JoinKind::Full);
    }
}

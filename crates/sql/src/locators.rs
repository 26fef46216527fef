//! Pre-pass that extracts inline source locators from a query's token
//! stream, so the resolver can bind readers to quoted FROM/JOIN paths
//! before planning completes.

use fsq_common::Result;

use crate::lexer::{tokenize, TokenKind};

/// Returns the quoted source locators of a query in appearance order.
///
/// Only single- or double-quoted sources following `FROM`, `JOIN`, or a
/// FROM-list comma count; bare table words are left for the caller's
/// default-source binding. Duplicates are preserved: the same path
/// appearing twice resolves to two independent readers.
pub fn extract_source_locators(sql: &str) -> Result<Vec<String>> {
    let tokens = tokenize(sql)?;
    let mut out = Vec::new();
    let mut expect_source = false;
    let mut in_from_list = false;
    for t in &tokens {
        match &t.kind {
            TokenKind::Word(w) => {
                let upper = w.to_ascii_uppercase();
                match upper.as_str() {
                    "FROM" => {
                        expect_source = true;
                        in_from_list = true;
                    }
                    "JOIN" => {
                        expect_source = true;
                        in_from_list = false;
                    }
                    "WHERE" | "GROUP" | "ORDER" | "LIMIT" | "ON" => {
                        expect_source = false;
                        in_from_list = false;
                    }
                    _ => expect_source = false,
                }
            }
            TokenKind::StringLit(s) if expect_source => {
                out.push(s.clone());
                expect_source = false;
            }
            TokenKind::Sym(crate::lexer::Symbol::Comma) if in_from_list => {
                expect_source = true;
            }
            _ => expect_source = false,
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_from_and_join_paths() {
        let paths = extract_source_locators(
            "SELECT u.name, o.amt FROM 'u.csv' u LEFT JOIN 'o.csv' o ON u.id = o.uid",
        )
        .unwrap();
        assert_eq!(paths, vec!["u.csv", "o.csv"]);
    }

    #[test]
    fn keeps_duplicates_independent() {
        let paths =
            extract_source_locators("SELECT * FROM 'a.csv' x JOIN 'a.csv' y ON x.id = y.id")
                .unwrap();
        assert_eq!(paths, vec!["a.csv", "a.csv"]);
    }

    #[test]
    fn comma_list_sources_are_found() {
        let paths = extract_source_locators("SELECT * FROM 'a.csv', 'b.csv'").unwrap();
        assert_eq!(paths, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn bare_tables_and_string_literals_elsewhere_are_ignored() {
        let paths =
            extract_source_locators("SELECT * FROM users WHERE name = 'alice.csv'").unwrap();
        assert!(paths.is_empty());
    }
}

//! Reference extraction from BigQuery SQL.
//!
//! The warehouse owns parsing and validation. This module only needs to
//! know which tables and routines a statement touches, and whether it
//! builds SQL at run time, so the dataset allow-list can be enforced before
//! the job is submitted.

use sqlparser::ast::{Expr, ObjectName, Statement, visit_expressions, visit_relations};
use sqlparser::dialect::BigQueryDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::ops::ControlFlow;

/// Function namespaces built into BigQuery (`NET.HOST`, `SAFE.DIVIDE`, ...).
const BUILTIN_NAMESPACES: &[&str] = &[
    "AEAD",
    "HLL_COUNT",
    "KEYS",
    "KLL_QUANTILES",
    "ML",
    "NET",
    "OBJ",
];

/// What a name says about where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualifier {
    /// Unqualified name (CTE, or object in a default dataset).
    None,
    /// Name qualified by a dataset, and possibly by a project.
    Dataset {
        project: Option<String>,
        dataset: String,
    },
    /// Region- or project-level `INFORMATION_SCHEMA` view.
    ProjectWide,
}

/// Names a statement refers to, as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    /// Tables, views and table functions.
    pub relations: Vec<String>,
    /// User routines: dataset-qualified function calls and `CALL` targets.
    pub routines: Vec<String>,
    /// The statement runs SQL assembled at run time (`EXECUTE IMMEDIATE`).
    pub dynamic_sql: bool,
}

impl References {
    /// Every relation and routine name.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.relations
            .iter()
            .chain(self.routines.iter())
            .map(String::as_str)
    }
}

/// Extracts references from SQL statements.
#[derive(Debug)]
pub struct SqlAnalyzer {
    dialect: BigQueryDialect,
}

impl Clone for SqlAnalyzer {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl Default for SqlAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlAnalyzer {
    pub fn new() -> Self {
        Self {
            dialect: BigQueryDialect {},
        }
    }

    /// Tables, routines and dynamic SQL in `sql`.
    ///
    /// Uses the parser when the statement parses and falls back to a
    /// token-level scan otherwise. Returns `None` when the text cannot even
    /// be tokenized.
    pub fn references(&self, sql: &str) -> Option<References> {
        let tokens = self.tokens(sql)?;

        let mut references = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => references_from_ast(&statements),
            Err(e) => {
                tracing::debug!(error = %e, "SQL did not parse, scanning tokens for references");
                references_from_tokens(&tokens)
            }
        };
        references.dynamic_sql |= has_dynamic_sql(&tokens);
        Some(references)
    }

    fn tokens(&self, sql: &str) -> Option<Vec<Token>> {
        let tokens = Tokenizer::new(&self.dialect, sql).tokenize().ok()?;
        Some(
            tokens
                .into_iter()
                .filter(|t| !matches!(t, Token::Whitespace(_)))
                .collect(),
        )
    }
}

fn references_from_ast(statements: &[Statement]) -> References {
    let mut references = References::default();
    for statement in statements {
        let _ = visit_relations(statement, |relation: &ObjectName| {
            references.relations.push(relation.to_string());
            ControlFlow::<()>::Continue(())
        });
        let _ = visit_expressions(statement, |expr: &Expr| {
            if let Expr::Function(function) = expr {
                references
                    .routines
                    .extend(user_routine(&function.name.to_string()));
            }
            ControlFlow::<()>::Continue(())
        });

        match statement {
            Statement::Call(function) => references.routines.push(function.name.to_string()),
            Statement::Execute { .. } => references.dynamic_sql = true,
            _ => {}
        }
    }
    references
}

fn references_from_tokens(tokens: &[Token]) -> References {
    let mut references = References::default();

    let mut i = 0;
    while i < tokens.len() {
        let starts_relation = is_keyword(&tokens[i], Keyword::FROM)
            || is_keyword(&tokens[i], Keyword::JOIN);
        i += 1;
        if !starts_relation {
            continue;
        }

        // FROM a.b x, c.d AS y, ...
        loop {
            let (name, next) = read_name(tokens, i);
            i = next;
            let Some(name) = name else { break };
            references.relations.push(name);

            i = skip_alias(tokens, i);
            if matches!(tokens.get(i), Some(Token::Comma)) {
                i += 1;
            } else {
                break;
            }
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        if is_word(token, "CALL") {
            if let (Some(name), _) = read_name(tokens, i + 1) {
                references.routines.push(name);
            }
            continue;
        }

        // Names that continue a previous one, or follow CALL, were already read.
        let already_read = i > 0
            && (matches!(tokens[i - 1], Token::Period | Token::Minus)
                || is_word(&tokens[i - 1], "CALL"));
        if !matches!(token, Token::Word(_)) || already_read {
            continue;
        }
        if let (Some(name), next) = read_name(tokens, i) {
            if matches!(tokens.get(next), Some(Token::LParen)) {
                references.routines.extend(user_routine(&name));
            }
        }
    }

    references
}

/// `EXECUTE IMMEDIATE` anywhere in the script.
fn has_dynamic_sql(tokens: &[Token]) -> bool {
    tokens
        .windows(2)
        .any(|pair| is_word(&pair[0], "EXECUTE") && is_word(&pair[1], "IMMEDIATE"))
}

fn is_word(token: &Token, value: &str) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(value))
}

fn is_keyword(token: &Token, keyword: Keyword) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.keyword == keyword)
}

/// The routine part of a function name, if it names a user routine in a
/// dataset. Builtins and unqualified names yield `None`.
fn user_routine(name: &str) -> Option<String> {
    let unquoted: String = name.chars().filter(|c| *c != '`').collect();
    let mut parts: Vec<&str> = unquoted.split('.').map(str::trim).collect();

    if parts.len() > 1 && parts[0].eq_ignore_ascii_case("SAFE") {
        parts.remove(0);
    }
    if parts.len() < 2 {
        return None;
    }
    if parts.len() == 2
        && BUILTIN_NAMESPACES
            .iter()
            .any(|ns| parts[0].eq_ignore_ascii_case(ns))
    {
        return None;
    }
    Some(parts.join("."))
}

/// Read a dotted (possibly hyphenated) name starting at `start`.
fn read_name(tokens: &[Token], start: usize) -> (Option<String>, usize) {
    let mut name = String::new();
    let mut i = start;
    let mut expect_part = true;

    while let Some(token) = tokens.get(i) {
        match token {
            Token::Word(w) if expect_part => {
                if w.quote_style.is_none() && is_clause_keyword(w.keyword) && name.is_empty() {
                    break;
                }
                name.push_str(&w.value);
                expect_part = false;
            }
            Token::Number(n, _) => {
                name.push_str(n);
                expect_part = false;
            }
            Token::Period | Token::Minus if !name.is_empty() => {
                name.push(if matches!(token, Token::Period) { '.' } else { '-' });
                expect_part = true;
            }
            _ => break,
        }
        i += 1;
    }

    if name.is_empty() { (None, i) } else { (Some(name), i) }
}

fn skip_alias(tokens: &[Token], mut i: usize) -> usize {
    if let Some(Token::Word(w)) = tokens.get(i) {
        if w.keyword == Keyword::AS {
            return i + 2;
        }
        if w.quote_style.is_some() || w.keyword == Keyword::NoKeyword {
            i += 1;
        }
    }
    i
}

fn is_clause_keyword(keyword: Keyword) -> bool {
    matches!(
        keyword,
        Keyword::SELECT
            | Keyword::WHERE
            | Keyword::ON
            | Keyword::USING
            | Keyword::GROUP
            | Keyword::ORDER
            | Keyword::LIMIT
            | Keyword::UNION
    )
}

/// Work out which project and dataset a name refers to.
///
/// Accepts `name`, `dataset.name`, `project.dataset.name`,
/// `[project.]dataset.INFORMATION_SCHEMA.VIEW` and
/// `[project.]region-xx.INFORMATION_SCHEMA.VIEW`, with or without backtick
/// quoting.
pub fn qualifier_of(name: &str) -> Qualifier {
    let unquoted: String = name.chars().filter(|c| *c != '`').collect();
    let parts: Vec<&str> = unquoted.split('.').map(str::trim).collect();

    let dataset_at = |pos: usize| {
        let project = pos.checked_sub(1).map(|p| parts[..=p].join("."));
        Qualifier::Dataset {
            project,
            dataset: parts[pos].to_string(),
        }
    };

    if let Some(pos) = parts
        .iter()
        .position(|p| p.eq_ignore_ascii_case("INFORMATION_SCHEMA"))
    {
        return match pos.checked_sub(1) {
            Some(q) if !parts[q].to_ascii_lowercase().starts_with("region-") => dataset_at(q),
            _ => Qualifier::ProjectWide,
        };
    }

    match parts.len() {
        0 | 1 => Qualifier::None,
        n => dataset_at(n - 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn references(sql: &str) -> References {
        SqlAnalyzer::new().references(sql).unwrap()
    }

    fn dataset(project: Option<&str>, dataset: &str) -> Qualifier {
        Qualifier::Dataset {
            project: project.map(str::to_string),
            dataset: dataset.to_string(),
        }
    }

    #[test]
    fn test_relations_simple_select() {
        assert_eq!(
            references("SELECT * FROM sales.orders").relations,
            vec!["sales.orders"]
        );
    }

    #[test]
    fn test_relations_join_and_subquery() {
        let names = references(
            "SELECT o.id FROM sales.orders o \
             JOIN (SELECT * FROM hr.people) p ON o.owner = p.id",
        )
        .relations;
        assert!(names.contains(&"sales.orders".to_string()));
        assert!(names.contains(&"hr.people".to_string()));
    }

    #[test]
    fn test_relations_backtick_path_keeps_project() {
        let names = references("SELECT * FROM `my-project.sales.orders`").relations;
        assert_eq!(names.len(), 1);
        assert_eq!(qualifier_of(&names[0]), dataset(Some("my-project"), "sales"));
    }

    #[test]
    fn test_token_scan_handles_unparseable_sql() {
        let analyzer = SqlAnalyzer::new();
        let tokens = analyzer
            .tokens("SELECT ??? FROM sales.orders o, hr.people AS p WHERE 1")
            .unwrap();
        assert_eq!(
            references_from_tokens(&tokens).relations,
            vec!["sales.orders", "hr.people"]
        );
    }

    #[test]
    fn test_untokenizable_sql_yields_nothing() {
        assert_eq!(
            SqlAnalyzer::new().references("SELECT * FROM hr.people WHERE x = 'open"),
            None
        );
    }

    #[test]
    fn test_execute_immediate_is_dynamic() {
        assert!(references("EXECUTE IMMEDIATE 'SELECT * FROM hr.people'").dynamic_sql);
        assert!(
            references("DECLARE q STRING; SET q = 'x'; execute immediate q;").dynamic_sql
        );
        assert!(!references("SELECT 'EXECUTE IMMEDIATE' AS s FROM sales.orders").dynamic_sql);
    }

    #[test]
    fn test_call_target_is_a_routine() {
        assert_eq!(references("CALL hr.leak_proc()").routines, vec!["hr.leak_proc"]);
    }

    #[test]
    fn test_qualified_function_is_a_routine() {
        let refs = references("SELECT hr.udf(id), SAFE.DIVIDE(a, b), NET.HOST(url) FROM sales.orders");
        assert_eq!(refs.routines, vec!["hr.udf"]);
    }

    #[test]
    fn test_token_scan_finds_routines() {
        let analyzer = SqlAnalyzer::new();
        let tokens = analyzer
            .tokens("SELECT ??? hr.udf(id) FROM sales.orders; CALL `ops.cleanup`()")
            .unwrap();
        let refs = references_from_tokens(&tokens);
        assert_eq!(refs.routines, vec!["hr.udf", "ops.cleanup"]);
    }

    #[test]
    fn test_user_routine_filters_builtins() {
        assert_eq!(user_routine("CONCAT"), None);
        assert_eq!(user_routine("SAFE.DIVIDE"), None);
        assert_eq!(user_routine("net.host"), None);
        assert_eq!(user_routine("SAFE.hr.udf"), Some("hr.udf".to_string()));
        assert_eq!(user_routine("`proj.hr.udf`"), Some("proj.hr.udf".to_string()));
    }

    #[test]
    fn test_qualifier_forms() {
        assert_eq!(qualifier_of("orders"), Qualifier::None);
        assert_eq!(qualifier_of("sales.orders"), dataset(None, "sales"));
        assert_eq!(qualifier_of("proj.sales.orders"), dataset(Some("proj"), "sales"));
        assert_eq!(
            qualifier_of("`sales`.INFORMATION_SCHEMA.TABLES"),
            dataset(None, "sales")
        );
        assert_eq!(
            qualifier_of("other.sales.INFORMATION_SCHEMA.TABLES"),
            dataset(Some("other"), "sales")
        );
        assert_eq!(
            qualifier_of("`region-us`.INFORMATION_SCHEMA.SCHEMATA"),
            Qualifier::ProjectWide
        );
        assert_eq!(
            qualifier_of("INFORMATION_SCHEMA.SCHEMATA"),
            Qualifier::ProjectWide
        );
    }
}

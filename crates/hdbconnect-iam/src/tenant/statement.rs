//! Row-scope statement rewriting
//!
//! Statements sent through a row-scoped [`TenantConnection`] are rewritten so
//! they can only see and touch the tenant's rows:
//!
//! - `SELECT`, `UPDATE` and `DELETE` get `"TENANT_ID" = ?` ANDed onto their
//!   `WHERE` clause (or a new one).
//! - `INSERT ... (cols) VALUES (...)` gets the tenant column and value appended.
//!
//! The tenant ID is always bound as a parameter, never spliced into the text.
//! Statements that cannot be confined reliably (comments, set operations,
//! multi-row inserts, DDL, procedure calls) are refused.
//!
//! [`TenantConnection`]: super::TenantConnection

use hdbconnect_async::HdbValue;

use super::error::{TenantError, TenantResult};
use super::handle::{TenantHandle, TenantScope};
use super::schema::quote_identifier;

/// Keywords that end a `WHERE` clause
const CLAUSE_END: &[&str] = &["GROUP", "ORDER", "HAVING", "LIMIT", "OFFSET", "FOR", "WITH"];

const SET_OPERATORS: &[&str] = &["UNION", "INTERSECT", "EXCEPT", "MINUS"];

/// Statement text and parameters as sent under a handle's scope
#[derive(Debug)]
pub struct ScopedStatement {
    pub sql: String,
    pub params: Vec<HdbValue<'static>>,
}

/// Confine a statement to the tenant of `handle`
///
/// Schema scope passes statement and parameters through unchanged. Row scope
/// adds the tenant predicate and inserts the tenant ID into `params` at the
/// position of its placeholder.
pub fn scope_statement(
    handle: &TenantHandle,
    sql: &str,
    mut params: Vec<HdbValue<'static>>,
) -> TenantResult<ScopedStatement> {
    let TenantScope::Row { column, value } = handle.scope() else {
        return Ok(ScopedStatement {
            sql: sql.to_string(),
            params,
        });
    };

    let sql = sql.trim().trim_end_matches(';').trim_end();
    let confined = confine(sql, column)?;
    if confined.placeholders != params.len() {
        return Err(unscoped(format!(
            "statement has {} placeholders but {} parameters were given",
            confined.placeholders,
            params.len()
        )));
    }

    params.insert(confined.tenant_param, HdbValue::STRING(value.clone()));
    Ok(ScopedStatement {
        sql: confined.sql,
        params,
    })
}

fn unscoped(reason: impl Into<String>) -> TenantError {
    TenantError::UnscopedStatement(reason.into())
}

#[derive(Debug)]
struct Word<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

/// Lexical outline of a statement
#[derive(Debug, Default)]
struct Scan<'a> {
    /// Bare words outside quotes and parentheses
    words: Vec<Word<'a>>,
    /// Byte offsets of `?` placeholders
    placeholders: Vec<usize>,
    /// Top-level parenthesized groups as `(open, close)` offsets
    groups: Vec<(usize, usize)>,
}

impl Scan<'_> {
    fn keyword(&self, after: usize, names: &[&str]) -> Option<&Word<'_>> {
        self.words.iter().find(|w| {
            w.start >= after && names.iter().any(|name| w.text.eq_ignore_ascii_case(name))
        })
    }

    fn placeholders_before(&self, offset: usize) -> usize {
        self.placeholders.iter().take_while(|&&p| p < offset).count()
    }
}

fn scan(sql: &str) -> TenantResult<Scan<'_>> {
    let bytes = sql.as_bytes();
    let mut scan = Scan::default();
    let mut depth = 0usize;
    let mut group_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\'' | b'"' => {
                let close = sql[i + 1..]
                    .find(char::from(b))
                    .ok_or_else(|| unscoped("unterminated quote"))?;
                i += close + 2;
                continue;
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => return Err(unscoped("comments")),
            b'/' if bytes.get(i + 1) == Some(&b'*') => return Err(unscoped("comments")),
            b';' => return Err(unscoped("multiple statements")),
            b'?' => scan.placeholders.push(i),
            b'(' => {
                if depth == 0 {
                    group_start = i;
                }
                depth += 1;
            }
            b')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| unscoped("unbalanced parentheses"))?;
                if depth == 0 {
                    scan.groups.push((group_start, i));
                }
            }
            _ if depth == 0 && (b.is_ascii_alphabetic() || b == b'_') => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                scan.words.push(Word {
                    text: &sql[start..i],
                    start,
                    end: i,
                });
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    if depth != 0 {
        return Err(unscoped("unbalanced parentheses"));
    }
    Ok(scan)
}

#[derive(Debug)]
struct Confined {
    sql: String,
    /// Index of the tenant value among the rewritten statement's parameters
    tenant_param: usize,
    /// Placeholders in the statement before rewriting
    placeholders: usize,
}

fn confine(sql: &str, column: &str) -> TenantResult<Confined> {
    let scan = scan(sql)?;
    let first = scan
        .words
        .first()
        .ok_or_else(|| unscoped("empty statement"))?;
    if let Some(op) = scan.keyword(0, SET_OPERATORS) {
        return Err(unscoped(format!("{} queries", op.text.to_ascii_uppercase())));
    }

    let predicate = format!("{} = ?", quote_identifier(column));
    let (rewritten, tenant_param) = match first.text.to_ascii_uppercase().as_str() {
        "SELECT" | "DELETE" => {
            let from = scan
                .keyword(first.end, &["FROM"])
                .ok_or_else(|| unscoped("statement without FROM"))?;
            confine_filter(sql, &scan, from.end, &predicate)?
        }
        "UPDATE" => {
            let set = scan
                .keyword(first.end, &["SET"])
                .ok_or_else(|| unscoped("UPDATE without SET"))?;
            let set_end = scan
                .keyword(set.end, &["WHERE"])
                .map_or(sql.len(), |w| w.start);
            if mentions(&sql[set.end..set_end], column) {
                return Err(unscoped(format!("UPDATE assigning {column}")));
            }
            confine_filter(sql, &scan, set.end, &predicate)?
        }
        "INSERT" => confine_insert(sql, &scan, column)?,
        other => return Err(unscoped(format!("{other} statements"))),
    };

    Ok(Confined {
        sql: rewritten,
        tenant_param,
        placeholders: scan.placeholders.len(),
    })
}

/// AND the predicate onto the `WHERE` clause following `anchor`, or add one
fn confine_filter(
    sql: &str,
    scan: &Scan<'_>,
    anchor: usize,
    predicate: &str,
) -> TenantResult<(String, usize)> {
    if let Some(where_kw) = scan.keyword(anchor, &["WHERE"]) {
        let end = scan
            .keyword(where_kw.end, CLAUSE_END)
            .map_or(sql.len(), |w| w.start);
        let condition = sql[where_kw.end..end].trim();
        if condition.is_empty() {
            return Err(unscoped("empty WHERE clause"));
        }
        let rewritten = format!(
            "{} ({condition}) AND {predicate}{}",
            &sql[..where_kw.end],
            tail(&sql[end..])
        );
        return Ok((rewritten, scan.placeholders_before(end)));
    }

    let end = scan.keyword(anchor, CLAUSE_END).map_or(sql.len(), |w| w.start);
    let rewritten = format!(
        "{} WHERE {predicate}{}",
        sql[..end].trim_end(),
        tail(&sql[end..])
    );
    Ok((rewritten, scan.placeholders_before(end)))
}

/// Append the tenant column to the column list and a placeholder to the row
fn confine_insert(sql: &str, scan: &Scan<'_>, column: &str) -> TenantResult<(String, usize)> {
    let values = scan
        .keyword(0, &["VALUES"])
        .ok_or_else(|| unscoped("INSERT without VALUES"))?;
    let &(columns_open, columns_close) = scan
        .groups
        .iter()
        .find(|(open, _)| *open < values.start)
        .ok_or_else(|| unscoped("INSERT without a column list"))?;
    if mentions(&sql[columns_open..columns_close], column) {
        return Err(unscoped(format!("INSERT naming {column}")));
    }

    let mut rows = scan.groups.iter().filter(|(open, _)| *open > values.end);
    let &(_, row_close) = rows
        .next()
        .ok_or_else(|| unscoped("INSERT without a value row"))?;
    if rows.next().is_some() || !sql[row_close + 1..].trim().is_empty() {
        return Err(unscoped("multi-row INSERT"));
    }

    let rewritten = format!(
        "{}, {}{}, ?{}",
        &sql[..columns_close],
        quote_identifier(column),
        &sql[columns_close..row_close],
        &sql[row_close..]
    );
    Ok((rewritten, scan.placeholders_before(row_close)))
}

fn mentions(fragment: &str, column: &str) -> bool {
    fragment
        .to_ascii_uppercase()
        .contains(&column.to_ascii_uppercase())
}

fn tail(rest: &str) -> String {
    if rest.is_empty() {
        String::new()
    } else {
        format!(" {rest}")
    }
}

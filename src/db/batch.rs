//! Multi-statement execution.
//!
//! SQL text is split into statements at `;` tokens, so semicolons inside
//! string literals, quoted identifiers and comments do not split. The
//! statements then run one by one on the connector's single session and
//! their rows are concatenated in statement order.

use crate::db::driver::NativeSession;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{BatchMode, DialectId, SqlResult};
use sqlparser::dialect::{Dialect, GenericDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};
use std::time::Duration;
use tracing::{debug, warn};

fn sql_dialect(dialect: DialectId) -> Box<dyn Dialect> {
    match dialect {
        DialectId::Hadb => Box::new(GenericDialect {}),
        DialectId::MySql => Box::new(MySqlDialect {}),
        DialectId::Postgres => Box::new(PostgreSqlDialect {}),
        DialectId::Sqlite => Box::new(SQLiteDialect {}),
    }
}

/// Split SQL text into trimmed statements.
///
/// Fragments holding only whitespace or comments are dropped. Text the
/// tokenizer rejects (an unterminated literal, say) falls back to a plain
/// split on every `;`.
pub fn split_statements(sql: &str, dialect: DialectId) -> Vec<String> {
    let sql_dialect = sql_dialect(dialect);
    match Tokenizer::new(sql_dialect.as_ref(), sql).tokenize_with_location() {
        Ok(tokens) => split_tokens(sql, &tokens),
        Err(e) => {
            debug!(error = %e, "Tokenizer rejected SQL, splitting on every ';'");
            naive_split(sql)
        }
    }
}

fn naive_split(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_tokens(sql: &str, tokens: &[TokenWithSpan]) -> Vec<String> {
    let lines = line_starts(sql);
    let mut statements = Vec::new();
    let mut start = 0;
    let mut meaningful = false;

    for token in tokens {
        match &token.token {
            Token::SemiColon => {
                let Some(end) = byte_offset(sql, &lines, token.span.start) else {
                    return naive_split(sql);
                };
                if meaningful {
                    statements.push(sql[start..end].trim().to_string());
                }
                start = end + 1;
                meaningful = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => meaningful = true,
        }
    }
    if meaningful {
        statements.push(sql[start..].trim().to_string());
    }
    statements
}

/// Byte offset of the first character of each line.
fn line_starts(sql: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// Convert a 1-based line/column location (columns count characters) into
/// a byte offset.
fn byte_offset(sql: &str, lines: &[usize], location: Location) -> Option<usize> {
    let line = usize::try_from(location.line).ok()?.checked_sub(1)?;
    let column = usize::try_from(location.column).ok()?.checked_sub(1)?;
    let line_start = *lines.get(line)?;
    sql[line_start..]
        .char_indices()
        .nth(column)
        .map(|(offset, _)| line_start + offset)
}

/// Run statements in order on one session.
///
/// The first failing statement stops the batch and is reported with its
/// 1-based index. In [`BatchMode::Transactional`] the batch is wrapped in a
/// transaction that is rolled back on failure; in
/// [`BatchMode::Autocommit`] earlier statements stay applied.
pub async fn execute_statements(
    session: &mut dyn NativeSession,
    statements: &[String],
    mode: BatchMode,
    statement_timeout: Duration,
) -> ConnectorResult<SqlResult> {
    let mut result = SqlResult::new();
    if statements.is_empty() {
        return Ok(result);
    }

    if mode == BatchMode::Transactional {
        with_timeout("begin transaction", statement_timeout, session.begin()).await?;
    }

    for (idx, statement) in statements.iter().enumerate() {
        let index = idx + 1;
        debug!(statement_index = index, mode = %mode, "Executing statement");
        match with_timeout("statement", statement_timeout, session.run(statement)).await {
            Ok(rows) => result.push_statement(rows),
            Err(e) => {
                warn!(statement_index = index, error = %e, "Statement failed, aborting batch");
                if mode == BatchMode::Transactional && !e.is_connection_lost() && !is_timeout(&e) {
                    if let Err(rollback_err) =
                        with_timeout("rollback", statement_timeout, session.rollback()).await
                    {
                        warn!(error = %rollback_err, "Rollback failed");
                    }
                }
                return Err(ConnectorError::statement(index, e));
            }
        }
    }

    if mode == BatchMode::Transactional {
        with_timeout("commit", statement_timeout, session.commit()).await?;
    }
    Ok(result)
}

fn is_timeout(e: &ConnectorError) -> bool {
    matches!(e, ConnectorError::Timeout { .. })
}

/// Await a native call, failing with a timeout error after `limit`.
pub async fn with_timeout<T>(
    operation: &str,
    limit: Duration,
    fut: impl std::future::Future<Output = ConnectorResult<T>>,
) -> ConnectorResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ConnectorError::timeout(operation, limit.as_secs())),
    }
}

//! CTE injection
//!
//! Folds the SQL of inlined (ephemeral) dependencies into a statement as
//! common table expressions. The statement is only tokenized, never parsed:
//! text outside the insertion point is kept byte for byte.

use std::collections::{HashMap, HashSet};

use ff_core::node::CteFragment;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan};

use crate::dialect::SqlDialect;
use crate::error::{SqlError, SqlResult};

/// Prepend `ctes` to `sql` as common table expressions.
///
/// If the statement opens with `WITH` (or `WITH RECURSIVE`) the fragments are
/// placed ahead of its own CTEs, joined by `", "` and followed by a comma.
/// Otherwise a `with` clause is synthesized in front of the first token.
/// An empty fragment list returns `sql` unchanged.
///
/// # Example
///
/// ```
/// use ff_core::node::CteFragment;
/// use ff_sql::{inject_ctes, PostgresDialect};
///
/// let ctes = [CteFragment::new("model.pkg.a", "a_cte as (select 1)")];
/// let sql = inject_ctes(&PostgresDialect::new(), "select * from a_cte", &ctes).unwrap();
/// assert_eq!(sql, "with a_cte as (select 1) select * from a_cte");
/// ```
pub fn inject_ctes(dialect: &dyn SqlDialect, sql: &str, ctes: &[CteFragment]) -> SqlResult<String> {
    if ctes.is_empty() {
        return Ok(sql.to_string());
    }

    let joined = ctes
        .iter()
        .map(|cte| cte.sql.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let tokens = dialect.tokenize(sql)?;
    let offsets = LineOffsets::new(sql);
    let mut significant = tokens.iter().filter(|t| !is_trivia(&t.token));

    let Some(first) = significant.next() else {
        return Ok(format!("{sql}with {joined} "));
    };

    if !is_keyword(first, Keyword::WITH) {
        let at = offsets.byte_offset(first.span.start);
        return Ok(format!("{}with {} {}", &sql[..at], joined, &sql[at..]));
    }

    let mut anchor = first;
    if let Some(next) = significant.next() {
        if is_keyword(next, Keyword::RECURSIVE) {
            anchor = next;
        }
    }
    let at = offsets.token_end(anchor);
    Ok(format!("{} {},{}", &sql[..at], joined, &sql[at..]))
}

/// Collect the CTE fragments a node needs, innermost dependency first.
///
/// Walks `deps` from `node_id`, descending through ephemeral dependencies
/// only; each ephemeral node contributes its fragment after the fragments
/// of the ephemerals it depends on. An ephemeral dependency without a
/// fragment has not been compiled yet and fails the walk.
pub fn collect_ephemeral_fragments<F, G>(
    node_id: &str,
    deps: &HashMap<String, Vec<String>>,
    is_ephemeral: F,
    fragment_for: G,
) -> SqlResult<Vec<CteFragment>>
where
    F: Fn(&str) -> bool,
    G: Fn(&str) -> Option<CteFragment>,
{
    let mut fragments = Vec::new();
    let mut visited = HashSet::new();
    if let Some(direct) = deps.get(node_id) {
        collect_recursive(
            direct,
            deps,
            &is_ephemeral,
            &fragment_for,
            &mut fragments,
            &mut visited,
        )?;
    }
    Ok(fragments)
}

fn collect_recursive<F, G>(
    ids: &[String],
    deps: &HashMap<String, Vec<String>>,
    is_ephemeral: &F,
    fragment_for: &G,
    fragments: &mut Vec<CteFragment>,
    visited: &mut HashSet<String>,
) -> SqlResult<()>
where
    F: Fn(&str) -> bool,
    G: Fn(&str) -> Option<CteFragment>,
{
    for id in ids {
        if !visited.insert(id.clone()) || !is_ephemeral(id) {
            continue;
        }
        if let Some(nested) = deps.get(id) {
            collect_recursive(nested, deps, is_ephemeral, fragment_for, fragments, visited)?;
        }
        let fragment =
            fragment_for(id).ok_or_else(|| SqlError::UncompiledDependency(id.clone()))?;
        fragments.push(fragment);
    }
    Ok(())
}

fn is_trivia(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_) | Token::EOF)
}

fn is_keyword(token: &TokenWithSpan, keyword: Keyword) -> bool {
    matches!(&token.token, Token::Word(w) if w.keyword == keyword && w.quote_style.is_none())
}

/// Maps tokenizer locations (1-based line, 1-based character column) to byte
/// offsets into the source text.
struct LineOffsets<'a> {
    sql: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineOffsets<'a> {
    fn new(sql: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { sql, starts }
    }

    fn byte_offset(&self, location: Location) -> usize {
        let line = (location.line as usize).saturating_sub(1);
        let Some(&start) = self.starts.get(line) else {
            return self.sql.len();
        };
        let column = (location.column as usize).saturating_sub(1);
        self.sql[start..]
            .char_indices()
            .nth(column)
            .map(|(i, _)| start + i)
            .unwrap_or(self.sql.len())
    }

    /// Byte offset just past a keyword token.
    fn token_end(&self, token: &TokenWithSpan) -> usize {
        let start = self.byte_offset(token.span.start);
        match &token.token {
            Token::Word(w) => (start + w.value.len()).min(self.sql.len()),
            _ => self.byte_offset(token.span.end),
        }
    }
}

#[cfg(test)]
#[path = "inject_test.rs"]
mod tests;

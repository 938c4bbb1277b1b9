//! SQL identifier quoting used when rendering relations and qualifiers

/// Quote a SQL identifier, doubling any embedded double quotes.
///
/// # Examples
/// ```
/// use ff_core::sql_utils::quote_ident;
/// assert_eq!(quote_ident("user_id"), r#""user_id""#);
/// assert_eq!(quote_ident(r#"odd"col"#), r#""odd""col""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote and comma-join a list of column names, as used in key clauses.
///
/// # Examples
/// ```
/// use ff_core::sql_utils::quote_ident_list;
/// assert_eq!(quote_ident_list(&["a", "b"]), r#""a", "b""#);
/// ```
pub fn quote_ident_list<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
#[path = "sql_utils_test.rs"]
mod tests;

//! Definition-tag rewriting.
//!
//! Template sources may declare `{% macro %}`, `{% materialization %}` and
//! `{% docs %}` blocks. Before the engine sees a source, each definition is
//! renamed to its reserved internal identifier and the two non-standard
//! block kinds are lowered to plain macros:
//!
//! ```text
//! {% macro foo(a) %}                       -> {% macro __macro__foo(a) %}
//! {% materialization view, default %}      -> {% macro __macro__materialization_view_default() %}
//! {% materialization table(sql), adapter='redshift' %}
//!                                          -> {% macro __macro__materialization_table_redshift(sql) %}
//! {% docs orders %}                        -> {% macro __docs__orders() %}
//! {% endmaterialization %} / {% enddocs %} -> {% endmacro %}
//! ```
//!
//! The scan skips comments, expression blocks and `{% raw %}` sections, is
//! aware of string literals inside tags, keeps whitespace-control markers and
//! never adds or removes newlines, so engine line numbers still match the
//! original source.

use crate::error::{CompileError, CompileResult};
use crate::symbols::{SymbolKey, SymbolTable};

/// A definition found while rewriting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub key: SymbolKey,
    pub internal_name: String,
    /// 1-based line of the opening tag
    pub line: usize,
}

/// Rewritten source plus the definitions it declares, in source order
#[derive(Debug, Clone)]
pub struct Rewritten {
    pub source: String,
    pub definitions: Vec<Definition>,
}

/// Rename every definition in `source`, registering it in `symbols`.
pub fn rewrite_definitions(source: &str, symbols: &mut SymbolTable) -> CompileResult<Rewritten> {
    let mut out = String::with_capacity(source.len() + 64);
    let mut definitions = Vec::new();
    let mut copied = 0;
    let mut pos = 0;

    while let Some(rel) = source[pos..].find('{') {
        let start = pos + rel;
        let rest = &source[start..];

        if rest.starts_with("{#") {
            match source[start + 2..].find("#}") {
                Some(end) => pos = start + 2 + end + 2,
                None => break,
            }
            continue;
        }
        if rest.starts_with("{{") {
            match find_close(source, start + 2, "}}") {
                Some(end) => pos = end + 2,
                None => break,
            }
            continue;
        }
        if !rest.starts_with("{%") {
            pos = start + 1;
            continue;
        }

        let Some(close) = find_close(source, start + 2, "%}") else {
            break;
        };
        let tag = BlockTag::split(&source[start + 2..close]);
        let line = line_of(source, start);
        pos = close + 2;

        let rebuilt = match tag.keyword() {
            "raw" => {
                pos = skip_raw(source, pos);
                continue;
            }
            "macro" => {
                let (name_start, name_end) = tag.name_span("macro").ok_or_else(|| {
                    syntax_at("macro tag requires a name", line)
                })?;
                let key = SymbolKey::macro_named(&tag.body[name_start..name_end]);
                let internal = intern(symbols, key.clone(), line)?;
                definitions.push(Definition {
                    key,
                    internal_name: internal.clone(),
                    line,
                });
                format!(
                    "{}{}{}",
                    &tag.body[..name_start],
                    internal,
                    &tag.body[name_end..]
                )
            }
            "materialization" => {
                let parsed = parse_materialization(tag.body, line)?;
                let key = SymbolKey::materialization(parsed.name, Some(&parsed.adapter));
                let internal = intern(symbols, key.clone(), line)?;
                definitions.push(Definition {
                    key,
                    internal_name: internal.clone(),
                    line,
                });
                format!(" macro {}({}) ", internal, parsed.params)
            }
            "docs" => {
                let (name_start, name_end) = tag
                    .name_span("docs")
                    .ok_or_else(|| syntax_at("docs tag requires a name", line))?;
                let key = SymbolKey::docs(&tag.body[name_start..name_end]);
                let internal = intern(symbols, key.clone(), line)?;
                definitions.push(Definition {
                    key,
                    internal_name: internal.clone(),
                    line,
                });
                format!(" macro {internal}() ")
            }
            "endmaterialization" | "enddocs" => " endmacro ".to_string(),
            _ => continue,
        };

        out.push_str(&source[copied..start]);
        out.push_str("{%");
        out.push_str(tag.lead);
        out.push_str(&rebuilt);
        out.push_str(tag.trail);
        out.push_str("%}");
        copied = close + 2;
    }

    out.push_str(&source[copied..]);
    Ok(Rewritten {
        source: out,
        definitions,
    })
}

/// Inner text of a `{% ... %}` tag, split into whitespace-control markers
/// and body.
struct BlockTag<'a> {
    lead: &'a str,
    body: &'a str,
    trail: &'a str,
}

impl<'a> BlockTag<'a> {
    fn split(inner: &'a str) -> Self {
        let is_ctl = |c: char| c == '-' || c == '+';
        let lead_len = inner.chars().next().filter(|c| is_ctl(*c)).map_or(0, |_| 1);
        let rest = &inner[lead_len..];
        let trail_len = rest
            .chars()
            .next_back()
            .filter(|c| is_ctl(*c))
            .map_or(0, |_| 1);
        Self {
            lead: &inner[..lead_len],
            body: &rest[..rest.len() - trail_len],
            trail: &rest[rest.len() - trail_len..],
        }
    }

    fn keyword(&self) -> &'a str {
        let body = self.body.trim_start();
        let end = body
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(body.len());
        &body[..end]
    }

    /// Byte span within `body` of the identifier following `keyword`.
    fn name_span(&self, keyword: &str) -> Option<(usize, usize)> {
        let kw_start = self.body.len() - self.body.trim_start().len();
        let after_kw = kw_start + keyword.len();
        let mut cursor = Cursor::new(self.body, after_kw);
        cursor.skip_ws();
        let start = cursor.pos;
        cursor.ident()?;
        Some((start, cursor.pos))
    }
}

struct Materialization<'a> {
    name: &'a str,
    params: &'a str,
    adapter: String,
}

fn parse_materialization(body: &str, line: usize) -> CompileResult<Materialization<'_>> {
    let kw_start = body.len() - body.trim_start().len();
    let mut cursor = Cursor::new(body, kw_start + "materialization".len());
    cursor.skip_ws();
    let name = cursor
        .ident()
        .ok_or_else(|| syntax_at("materialization tag requires a name", line))?;

    cursor.skip_ws();
    let mut params = "";
    if cursor.peek() == Some('(') {
        let open = cursor.pos;
        let close = find_matching_paren(body, open)
            .ok_or_else(|| syntax_at("unclosed parameter list in materialization tag", line))?;
        params = &body[open + 1..close];
        cursor.pos = close + 1;
    }

    let mut adapter = crate::symbols::DEFAULT_ADAPTER.to_string();
    loop {
        cursor.skip_ws();
        if cursor.at_end() {
            break;
        }
        if !cursor.eat(',') {
            return Err(syntax_at(
                format!(
                    "materialization '{}' has unexpected text '{}'",
                    name,
                    cursor.rest().trim()
                ),
                line,
            ));
        }
        cursor.skip_ws();
        let arg = cursor.ident().unwrap_or("");
        match arg {
            "default" => {}
            "adapter" => {
                cursor.skip_ws();
                if !cursor.eat('=') {
                    return Err(syntax_at(
                        format!("materialization '{name}' expects adapter='<name>'"),
                        line,
                    ));
                }
                cursor.skip_ws();
                adapter = cursor.string_literal().ok_or_else(|| {
                    syntax_at(
                        format!("materialization '{name}' adapter must be a string literal"),
                        line,
                    )
                })?;
            }
            other => {
                let shown = if other.is_empty() {
                    cursor.rest().trim()
                } else {
                    other
                };
                return Err(syntax_at(
                    format!("materialization '{name}' received unknown argument '{shown}'"),
                    line,
                ));
            }
        }
    }

    Ok(Materialization {
        name,
        params,
        adapter,
    })
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str, pos: usize) -> Self {
        Self {
            text,
            pos: pos.min(text.len()),
        }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let first = rest.chars().next()?;
        if !(first.is_ascii_alphabetic() || first == '_') {
            return None;
        }
        let len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
        self.pos += len;
        Some(&rest[..len])
    }

    fn string_literal(&mut self) -> Option<String> {
        let quote = self.peek().filter(|c| *c == '\'' || *c == '"')?;
        let end = skip_string(self.text, self.pos)?;
        let value = self.text[self.pos + 1..end - 1].replace(&format!("\\{quote}"), &quote.to_string());
        self.pos = end;
        Some(value)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Index of `delim` at or after `from`, skipping quoted strings.
fn find_close(source: &str, from: usize, delim: &str) -> Option<usize> {
    let mut i = from;
    while i < source.len() {
        let rest = &source[i..];
        if rest.starts_with(delim) {
            return Some(i);
        }
        let c = rest.chars().next()?;
        if c == '\'' || c == '"' {
            i = skip_string(source, i)?;
        } else {
            i += c.len_utf8();
        }
    }
    None
}

/// Byte index just past the string literal opening at `start`.
fn skip_string(source: &str, start: usize) -> Option<usize> {
    let mut chars = source[start..].char_indices();
    let (_, quote) = chars.next()?;
    let mut escaped = false;
    for (offset, c) in chars {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(start + offset + c.len_utf8());
        }
    }
    None
}

fn find_matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < text.len() {
        let c = text[i..].chars().next()?;
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            '\'' | '"' => {
                i = skip_string(text, i)?;
                continue;
            }
            _ => {}
        }
        i += c.len_utf8();
    }
    None
}

/// Position just past the `{% endraw %}` that closes a raw block.
fn skip_raw(source: &str, from: usize) -> usize {
    let mut pos = from;
    while let Some(rel) = source[pos..].find("{%") {
        let start = pos + rel;
        let Some(close) = find_close(source, start + 2, "%}") else {
            break;
        };
        if BlockTag::split(&source[start + 2..close]).keyword() == "endraw" {
            return close + 2;
        }
        pos = close + 2;
    }
    source.len()
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].matches('\n').count() + 1
}

fn intern(symbols: &mut SymbolTable, key: SymbolKey, line: usize) -> CompileResult<String> {
    symbols.intern(key).map_err(|err| match err {
        CompileError::TemplateSyntax { node, message, .. } => CompileError::TemplateSyntax {
            node,
            message,
            line: Some(line),
        },
        other => other,
    })
}

fn syntax_at(message: impl Into<String>, line: usize) -> CompileError {
    CompileError::TemplateSyntax {
        node: None,
        message: message.into(),
        line: Some(line),
    }
}

#[cfg(test)]
#[path = "syntax_test.rs"]
mod tests;

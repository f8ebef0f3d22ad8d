// File: src/query/plan.rs

//! Federated query planning
//!
//! Derives, from the literal statement text, which tables it reads, whether
//! cold access is needed, and the ORDER BY / LIMIT that must be re-applied
//! after hot and cold results are merged. ORDER BY terms that aren't result
//! columns are appended to the per-store statement as extra columns.

use rusqlite::types::Value;
use serde::Serialize;

use super::sql::{matching_close, tokenize, Token, TokenKind};
use crate::classification::{ArchivableTable, Classification};
use crate::error::{ArchiveError, ArchiveResult};

/// Words that end a table reference instead of aliasing it
const RESERVED: &[&str] = &[
    "AS", "CROSS", "EXCEPT", "FROM", "FULL", "GROUP", "HAVING", "INDEXED", "INNER",
    "INTERSECT", "JOIN", "LEFT", "LIMIT", "NATURAL", "NOT", "OFFSET", "ON", "ORDER",
    "OUTER", "RETURNING", "RIGHT", "SELECT", "UNION", "USING", "VALUES", "WHERE", "WINDOW",
];

/// Operator words; an implicit alias never follows or is one of these
const OPERATOR_WORDS: &[&str] = &[
    "AND", "BETWEEN", "CASE", "COLLATE", "DISTINCT", "ELSE", "ESCAPE", "GLOB", "IN", "IS",
    "LIKE", "MATCH", "OR", "REGEXP", "THEN", "WHEN",
];

/// Words that end an expression but can't be an alias
const LITERAL_WORDS: &[&str] = &[
    "CURRENT_DATE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "END", "FALSE", "NULL", "TRUE",
];

/// Words that end the select list of a SELECT core
const SELECT_LIST_END: &[&str] = &[
    "EXCEPT", "FROM", "GROUP", "HAVING", "INTERSECT", "LIMIT", "ORDER", "UNION", "WHERE",
    "WINDOW",
];

/// Sort key of one ORDER BY term
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OrderKey {
    /// 1-based result column position
    Position(usize),
    /// Result column name
    Name(String),
    /// Extra column appended to each per-store statement and dropped after
    /// the merge; 0-based among the appended columns
    Hidden(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTerm {
    pub key: OrderKey,
    pub descending: bool,
    pub nulls_first: bool,
}

/// Trailing `LIMIT`, with parameters already bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limit {
    /// `None` for a negative limit (no upper bound)
    pub count: Option<u64>,
    pub offset: u64,
}

impl Limit {
    pub fn apply<T>(&self, rows: Vec<T>) -> Vec<T> {
        let skipped = rows.into_iter().skip(self.offset as usize);
        match self.count {
            Some(n) => skipped.take(n as usize).collect(),
            None => skipped.collect(),
        }
    }
}

/// How a statement is routed and how federated results are post-processed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FederatedQueryPlan {
    pub sql_text: String,
    #[serde(skip)]
    pub params: Vec<Value>,
    /// Tables read by the statement (CTE names and table functions excluded)
    pub source_tables: Vec<String>,
    pub requires_cold: bool,
    pub order_by: Vec<OrderTerm>,
    pub limit: Option<Limit>,
    /// Trailing result columns that exist only to sort by
    pub hidden_columns: usize,
    #[serde(skip)]
    federated_sql: String,
    #[serde(skip)]
    federated_params: Vec<Value>,
}

/// Per-store statement and the post-merge ORDER BY / LIMIT
struct FederationParts {
    order_by: Vec<OrderTerm>,
    limit: Option<Limit>,
    hidden_columns: usize,
    sql: String,
    params: Vec<Value>,
}

impl FederationParts {
    /// Statement run as-is on each store, nothing re-applied
    fn passthrough(sql: &str, tokens: &[Token], params: &[Value]) -> Self {
        let end = tokens.last().map(|t| t.end).unwrap_or(sql.len());
        Self {
            order_by: Vec::new(),
            limit: None,
            hidden_columns: 0,
            sql: sql[..end].trim_end().to_string(),
            params: params.to_vec(),
        }
    }
}

impl FederatedQueryPlan {
    pub fn build(
        sql: &str,
        params: &[Value],
        classification: &Classification,
        federate: bool,
    ) -> ArchiveResult<Self> {
        let mut tokens = tokenize(sql)?;

        if let Some(pos) = tokens.iter().position(|t| t.depth == 0 && t.is_punct(';')) {
            if tokens[pos + 1..].iter().any(|t| !t.is_punct(';')) {
                return Err(ArchiveError::InvalidArgument(
                    "only a single statement can be routed".into(),
                ));
            }
            tokens.truncate(pos);
        }
        if tokens.is_empty() {
            return Err(ArchiveError::InvalidArgument("empty statement".into()));
        }

        let ctes = cte_names(&tokens);
        let source_tables = source_tables(&tokens, &ctes);
        let requires_cold = federate
            && source_tables
                .iter()
                .any(|t| classification.archivable(t).is_ok());

        // Only a federated run depends on the post-merge parts
        let parts = match federation_parts(sql, &tokens, params) {
            Ok(parts) => parts,
            Err(e) if requires_cold => return Err(e),
            Err(_) => FederationParts::passthrough(sql, &tokens, params),
        };

        Ok(Self {
            sql_text: sql.to_string(),
            params: params.to_vec(),
            source_tables,
            requires_cold,
            order_by: parts.order_by,
            limit: parts.limit,
            hidden_columns: parts.hidden_columns,
            federated_sql: parts.sql,
            federated_params: parts.params,
        })
    }

    /// Statement run against each store when federating: trailing LIMIT
    /// removed, sort-only columns appended
    pub fn federated_sql(&self) -> &str {
        &self.federated_sql
    }

    /// Parameters bound to [`Self::federated_sql`]
    pub fn federated_params(&self) -> &[Value] {
        &self.federated_params
    }

    /// First archivable source table; its primary key drives deduplication
    pub fn key_table(&self, classification: &Classification) -> Option<ArchivableTable> {
        self.source_tables
            .iter()
            .find_map(|t| classification.archivable(t).ok())
    }
}

/// Names introduced by WITH clauses, at any nesting level
fn cte_names(tokens: &[Token]) -> Vec<String> {
    let mut names = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if !token.is_keyword("WITH") {
            continue;
        }
        let depth = token.depth;
        let mut k = i + 1;
        if tokens.get(k).is_some_and(|t| t.is_keyword("RECURSIVE")) {
            k += 1;
        }

        loop {
            let Some(name) = tokens.get(k).filter(|t| t.is_name() && t.depth == depth) else {
                break;
            };
            names.push(name.text.clone());
            k += 1;

            // Optional column list
            if tokens.get(k).is_some_and(|t| t.is_punct('(')) {
                let Some(close) = matching_close(tokens, k) else { break };
                k = close + 1;
            }
            if !tokens.get(k).is_some_and(|t| t.is_keyword("AS")) {
                break;
            }
            k += 1;
            while tokens
                .get(k)
                .is_some_and(|t| t.is_keyword("NOT") || t.is_keyword("MATERIALIZED"))
            {
                k += 1;
            }
            if !tokens.get(k).is_some_and(|t| t.is_punct('(')) {
                break;
            }
            let Some(close) = matching_close(tokens, k) else { break };
            k = close + 1;

            if tokens.get(k).is_some_and(|t| t.is_punct(',') && t.depth == depth) {
                k += 1;
            } else {
                break;
            }
        }
    }

    names
}

fn is_reserved(token: &Token) -> bool {
    token.kind == TokenKind::Word && RESERVED.iter().any(|r| token.is_keyword(r))
}

fn is_table_name(token: &Token) -> bool {
    token.is_name() && !is_reserved(token)
}

/// Tables named after FROM / JOIN (and in FROM comma lists)
fn source_tables(tokens: &[Token], ctes: &[String]) -> Vec<String> {
    let mut tables: Vec<String> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if !(token.is_keyword("FROM") || token.is_keyword("JOIN")) {
            continue;
        }
        // `a IS DISTINCT FROM b` compares values
        if i > 0 && tokens[i - 1].is_keyword("DISTINCT") {
            continue;
        }

        let depth = token.depth;
        let mut k = i + 1;
        loop {
            let Some(current) = tokens.get(k).filter(|t| t.depth == depth) else {
                break;
            };

            if current.is_punct('(') {
                // Subquery or parenthesized join; its own FROM is visited separately
                let Some(close) = matching_close(tokens, k) else { break };
                k = close + 1;
            } else if is_table_name(current) {
                let mut name = &current.text;
                k += 1;
                if tokens.get(k).is_some_and(|t| t.is_punct('.'))
                    && tokens.get(k + 1).is_some_and(|t| t.is_name())
                {
                    name = &tokens[k + 1].text;
                    k += 2;
                }

                if tokens.get(k).is_some_and(|t| t.is_punct('(')) {
                    // Table-valued function
                    let Some(close) = matching_close(tokens, k) else { break };
                    k = close + 1;
                } else {
                    let known = |n: &String| n.eq_ignore_ascii_case(name);
                    if !ctes.iter().any(known) && !tables.iter().any(known) {
                        tables.push(name.clone());
                    }
                }
            } else {
                break;
            }

            // Alias
            if tokens.get(k).is_some_and(|t| t.is_keyword("AS")) {
                k += 2;
            } else if tokens.get(k).is_some_and(is_table_name) {
                k += 1;
            }

            if tokens.get(k).is_some_and(|t| t.is_punct(',') && t.depth == depth) {
                k += 1;
            } else {
                break;
            }
        }
    }

    tables
}

fn federation_parts(sql: &str, tokens: &[Token], params: &[Value]) -> ArchiveResult<FederationParts> {
    let indexes = param_indexes(tokens);

    let (limit, end) = match trailing_limit(tokens, &indexes, params)? {
        Some((idx, limit)) => (Some(limit), idx),
        None => (None, tokens.len()),
    };
    let body = &tokens[..end];

    let core = SelectCore::find(body);
    let mut order_by = Vec::new();
    let mut hidden = Vec::new();

    for (expr, descending, nulls_first) in order_by_terms(body)? {
        let key = match resolve_order_key(&expr, core.as_ref()) {
            Some(key) => key,
            None => {
                let text = hidden_expression(sql, &expr, core.as_ref())?;
                hidden.push(text);
                OrderKey::Hidden(hidden.len() - 1)
            }
        };
        order_by.push(OrderTerm {
            key,
            descending,
            nulls_first,
        });
    }

    let body_end = body.last().map(|t| t.end).unwrap_or(0);
    let mut federated = sql[..body_end].to_string();
    if let Some(core) = core.as_ref().filter(|_| !hidden.is_empty()) {
        let appended: String = hidden
            .iter()
            .enumerate()
            .map(|(k, text)| format!(", {} AS \"__order_{}\"", text, k))
            .collect();
        federated.insert_str(core.list_end, &appended);
    }

    // SQLite checks the parameter count, so drop those only the LIMIT used
    let federated_params = if limit.is_some() {
        let used = indexes[..end].iter().flatten().max().copied().unwrap_or(0);
        params[..used.min(params.len())].to_vec()
    } else {
        params.to_vec()
    };

    Ok(FederationParts {
        order_by,
        limit,
        hidden_columns: hidden.len(),
        sql: federated.trim_end().to_string(),
        params: federated_params,
    })
}

/// SQLite parameter index of each token (`None` for non-parameters)
///
/// `?NNN` is NNN; `?` is one past the largest so far; a named parameter
/// reuses its first index.
fn param_indexes(tokens: &[Token]) -> Vec<Option<usize>> {
    let mut max = 0usize;
    let mut named: Vec<(&str, usize)> = Vec::new();

    tokens
        .iter()
        .map(|t| {
            if t.kind != TokenKind::Param {
                return None;
            }
            let index = if let Some(digits) = t.text.strip_prefix('?') {
                match digits.parse::<usize>() {
                    Ok(n) => n,
                    Err(_) => max + 1,
                }
            } else if let Some((_, n)) = named.iter().find(|(name, _)| *name == t.text) {
                *n
            } else {
                named.push((&t.text, max + 1));
                max + 1
            };
            max = max.max(index);
            Some(index)
        })
        .collect()
}

/// Result columns of the first top-level SELECT core
struct SelectCore {
    items: Vec<SelectItem>,
    /// Byte offset just past the last item
    list_end: usize,
    distinct: bool,
    compound: bool,
}

struct SelectItem {
    /// Token text with case and spacing normalized
    expr: String,
    alias: Option<String>,
    /// Column name when the item is a plain (optionally qualified) column
    column: Option<String>,
    star: bool,
}

impl SelectCore {
    fn find(tokens: &[Token]) -> Option<Self> {
        let select = tokens
            .iter()
            .position(|t| t.depth == 0 && t.is_keyword("SELECT"))?;
        let mut k = select + 1;
        let mut distinct = false;
        if let Some(t) = tokens.get(k) {
            if t.is_keyword("DISTINCT") || t.is_keyword("ALL") {
                distinct = t.is_keyword("DISTINCT");
                k += 1;
            }
        }

        let mut end = k;
        while let Some(t) = tokens.get(end) {
            let distinct_from = t.is_keyword("FROM") && tokens[end - 1].is_keyword("DISTINCT");
            if t.depth == 0 && !distinct_from && SELECT_LIST_END.iter().any(|w| t.is_keyword(w)) {
                break;
            }
            end += 1;
        }
        let list = &tokens[k..end];
        let list_end = list.last()?.end;

        let items = list
            .split(|t| t.depth == 0 && t.is_punct(','))
            .map(SelectItem::parse)
            .collect();
        let compound = tokens.iter().any(|t| {
            t.depth == 0 && (t.is_keyword("UNION") || t.is_keyword("INTERSECT") || t.is_keyword("EXCEPT"))
        });

        Some(Self {
            items,
            list_end,
            distinct,
            compound,
        })
    }

    /// Position of item `i`, unknown once a `*` precedes it
    fn position(&self, i: usize) -> Option<usize> {
        if self.items[..i].iter().any(|item| item.star) {
            None
        } else {
            Some(i + 1)
        }
    }

    fn has_star(&self) -> bool {
        self.items.iter().any(|item| item.star)
    }
}

impl SelectItem {
    fn parse(tokens: &[Token]) -> Self {
        let n = tokens.len();
        let (expr, alias) = if n >= 3 && tokens[n - 2].is_keyword("AS") && tokens[n - 1].is_name() {
            (&tokens[..n - 2], Some(tokens[n - 1].text.clone()))
        } else if n >= 2 && implicit_alias(&tokens[n - 2], &tokens[n - 1]) {
            (&tokens[..n - 1], Some(tokens[n - 1].text.clone()))
        } else {
            (tokens, None)
        };

        let star = matches!(expr, [s] if s.is_punct('*'))
            || matches!(expr, [q, dot, s] if q.is_name() && dot.is_punct('.') && s.is_punct('*'));

        Self {
            expr: normalize(expr),
            alias,
            column: column_name(expr),
            star,
        }
    }
}

fn implicit_alias(previous: &Token, last: &Token) -> bool {
    let operator = |t: &Token| is_reserved(t) || OPERATOR_WORDS.iter().any(|w| t.is_keyword(w));
    let previous_ok = match previous.kind {
        TokenKind::Word => !operator(previous),
        TokenKind::QuotedIdent | TokenKind::Str | TokenKind::Number | TokenKind::Param => true,
        TokenKind::Punct(c) => c == ')',
    };
    let last_ok = match last.kind {
        TokenKind::QuotedIdent => true,
        TokenKind::Word => !operator(last) && !LITERAL_WORDS.iter().any(|w| last.is_keyword(w)),
        _ => false,
    };
    previous_ok && last_ok
}

/// `name` or `qualifier.name`
fn column_name(expr: &[Token]) -> Option<String> {
    match expr {
        [only] if only.is_name() => Some(only.text.clone()),
        [qualifier, dot, column] if qualifier.is_name() && dot.is_punct('.') && column.is_name() => {
            Some(column.text.clone())
        }
        _ => None,
    }
}

fn normalize(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| match t.kind {
            TokenKind::Word | TokenKind::QuotedIdent => t.text.to_ascii_lowercase(),
            TokenKind::Str => format!("'{}'", t.text.replace('\'', "''")),
            _ => t.text.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Terms of the last top-level ORDER BY as (expression, descending, nulls first)
fn order_by_terms(tokens: &[Token]) -> ArchiveResult<Vec<(Vec<Token>, bool, bool)>> {
    let start = tokens
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0].depth == 0 && w[0].is_keyword("ORDER") && w[1].is_keyword("BY"))
        .map(|(i, _)| i + 2)
        .last();
    let Some(start) = start else {
        return Ok(Vec::new());
    };

    tokens[start..]
        .split(|t| t.depth == 0 && t.is_punct(','))
        .map(order_term)
        .collect()
}

fn order_term(mut term: &[Token]) -> ArchiveResult<(Vec<Token>, bool, bool)> {
    let mut nulls_first = None;
    let mut descending = false;

    let n = term.len();
    if n >= 2 && term[n - 2].is_keyword("NULLS") {
        nulls_first = Some(term[n - 1].is_keyword("FIRST"));
        term = &term[..n - 2];
    }
    if let Some(last) = term.last() {
        if last.is_keyword("DESC") || last.is_keyword("ASC") {
            descending = last.is_keyword("DESC");
            term = &term[..term.len() - 1];
        }
    }
    let n = term.len();
    if n >= 2 && term[n - 2].is_keyword("COLLATE") {
        term = &term[..n - 2];
    }
    if term.is_empty() {
        return Err(ArchiveError::InvalidArgument("empty ORDER BY term".into()));
    }

    Ok((term.to_vec(), descending, nulls_first.unwrap_or(!descending)))
}

/// Map an ORDER BY expression onto a result column, if it names one
fn resolve_order_key(expr: &[Token], core: Option<&SelectCore>) -> Option<OrderKey> {
    if let [only] = expr {
        if only.kind == TokenKind::Number {
            return only.text.parse().ok().map(OrderKey::Position);
        }
    }

    let core = core?;
    if let [only] = expr {
        if only.is_name() {
            let alias = core.items.iter().find_map(|item| {
                item.alias
                    .as_ref()
                    .filter(|a| a.eq_ignore_ascii_case(&only.text))
            });
            if let Some(alias) = alias {
                return Some(OrderKey::Name(alias.clone()));
            }
        }
    }

    let normalized = normalize(expr);
    if let Some(i) = core.items.iter().position(|item| item.expr == normalized) {
        if let Some(p) = core.position(i) {
            return Some(OrderKey::Position(p));
        }
    }

    let column = column_name(expr)?;
    let i = core.items.iter().position(|item| {
        item.column
            .as_ref()
            .is_some_and(|c| c.eq_ignore_ascii_case(&column))
    });
    match i.and_then(|i| core.position(i)) {
        Some(p) => Some(OrderKey::Position(p)),
        // A plain column under `*` keeps its own name
        None if core.has_star() && (core.compound || core.distinct) => Some(OrderKey::Name(column)),
        None => None,
    }
}

/// Source text of an ORDER BY expression to append as a result column
fn hidden_expression(sql: &str, expr: &[Token], core: Option<&SelectCore>) -> ArchiveResult<String> {
    let unsupported = |why: &str| {
        Err(ArchiveError::InvalidArgument(format!(
            "federated ORDER BY {} {}",
            normalize(expr),
            why
        )))
    };

    let Some(core) = core else {
        return unsupported("must name a result column");
    };
    if core.compound {
        return unsupported("must name a result column of a compound SELECT");
    }
    if core.distinct {
        return unsupported("must name a result column of a SELECT DISTINCT");
    }
    // Appended text sits before later parameters, so only numbered ones keep their index
    let unnumbered = expr.iter().any(|t| {
        t.kind == TokenKind::Param && !(t.text.len() > 1 && t.text.starts_with('?'))
    });
    if unnumbered {
        return unsupported("can't use unnumbered parameters outside the result columns");
    }

    match (expr.first(), expr.last()) {
        (Some(first), Some(last)) => Ok(sql[first.start..last.end].to_string()),
        _ => unsupported("is empty"),
    }
}

/// `LIMIT n`, `LIMIT n OFFSET m` or `LIMIT m, n` ending the statement
///
/// Values are literals or parameters. Returns the index of the LIMIT token.
fn trailing_limit(
    tokens: &[Token],
    indexes: &[Option<usize>],
    params: &[Value],
) -> ArchiveResult<Option<(usize, Limit)>> {
    let Some(idx) = tokens
        .iter()
        .rposition(|t| t.depth == 0 && t.is_keyword("LIMIT"))
    else {
        return Ok(None);
    };

    let value = |at: usize| -> ArchiveResult<(i64, usize)> {
        limit_value(&tokens[at..], &indexes[at..], params).ok_or_else(|| {
            ArchiveError::InvalidArgument(
                "federated LIMIT and OFFSET must be integer literals or integer parameters".into(),
            )
        })
    };

    let (first, used) = value(idx + 1)?;
    let next = idx + 1 + used;

    let limit = match tokens.get(next) {
        None => Limit {
            count: u64::try_from(first).ok(),
            offset: 0,
        },
        Some(t) if t.is_keyword("OFFSET") || t.is_punct(',') => {
            let (second, used) = value(next + 1)?;
            if next + 1 + used != tokens.len() {
                return Err(ArchiveError::InvalidArgument(
                    "federated LIMIT must end the statement".into(),
                ));
            }
            let (count, offset) = if t.is_punct(',') {
                (second, first)
            } else {
                (first, second)
            };
            Limit {
                count: u64::try_from(count).ok(),
                offset: offset.max(0) as u64,
            }
        }
        Some(_) => {
            return Err(ArchiveError::InvalidArgument(
                "federated LIMIT must end the statement".into(),
            ))
        }
    };

    Ok(Some((idx, limit)))
}

/// A signed integer literal or a bound integer parameter, and tokens used
fn limit_value(tokens: &[Token], indexes: &[Option<usize>], params: &[Value]) -> Option<(i64, usize)> {
    match tokens {
        [minus, number, ..] if minus.is_punct('-') && number.kind == TokenKind::Number => {
            number.text.parse::<i64>().ok().map(|n| (-n, 2))
        }
        [number, ..] if number.kind == TokenKind::Number => {
            number.text.parse::<i64>().ok().map(|n| (n, 1))
        }
        [param, ..] if param.kind == TokenKind::Param => {
            let index = indexes.first().copied().flatten()?;
            match params.get(index.checked_sub(1)?)? {
                Value::Integer(n) => Some((*n, 1)),
                Value::Real(f) if f.fract() == 0.0 => Some((*f as i64, 1)),
                _ => None,
            }
        }
        _ => None,
    }
}

use std::fmt;
use std::ops::ControlFlow;
use std::sync::LazyLock;

use regex::Regex;
use sqlparser::ast::{ObjectName, Query, SetExpr, Statement, TableFactor, Visit, Visitor};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;

use crate::catalog;

/// Row cap applied to a statement. `max_rows == 0` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub max_rows: usize,
}

impl LimitPolicy {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    pub fn unbounded() -> Self {
        Self { max_rows: 0 }
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_rows == 0
    }
}

/// Why a statement was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialKind {
    Empty,
    MultipleStatements,
    Comment,
    NotSelect,
    ForbiddenKeyword,
    SystemObject,
    CommaJoin,
    TableNotAllowed,
    InvalidLimit,
    ParseFailure,
    UnsafeQueryBody,
}

/// A single denial reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub detail: String,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// Outcome of validating one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Safe to execute, with the row limit enforced.
    Sanitized(String),
    Rejected(DenialReason),
}

impl ValidationOutcome {
    pub fn into_result(self) -> Result<String, DenialReason> {
        match self {
            ValidationOutcome::Sanitized(sql) => Ok(sql),
            ValidationOutcome::Rejected(reason) => Err(reason),
        }
    }
}

const IDENT: &str = r#"(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|[a-zA-Z_][a-zA-Z0-9_]*)"#;

static STATEMENT_KIND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:select|with)\b").expect("statement kind pattern"));

static FORBIDDEN_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|replace|truncate|create|alter|drop|commit|rollback|savepoint|begin|transaction|attach|detach|pragma|vacuum|reindex|grant|revoke|analyze|load_extension)\b",
    )
    .expect("forbidden keyword pattern")
});

static FROM_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?is)\b(?:from|join)\b\s*({IDENT}(?:\s*\.\s*{IDENT})?)")).expect("from/join pattern")
});

static CTE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?is)(?:\bwith\b(?:\s+recursive\b)?\s*|,\s*)({IDENT})(?:\s+|\s*\([^()]*\)\s*)as\s*\("
    ))
    .expect("cte pattern")
});

static FROM_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\b").expect("from pattern"));

static LIMIT_KEYWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blimit\b").expect("limit pattern"));

static LIMIT_OPERAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)(?:\s*,\s*(\d+))?").expect("limit operand pattern"));

const SYSTEM_OBJECTS: &[&str] = &[
    "sqlite_master",
    "sqlite_schema",
    "sqlite_temp_master",
    "sqlite_temp_schema",
    "sqlite_sequence",
    "sqlite_stat",
    "pragma_",
];

/// Keywords that end the table list of a FROM clause.
const FROM_TERMINATORS: &[&str] = &[
    "where", "group", "order", "having", "limit", "offset", "union", "intersect", "except",
    "window",
];

/// Validate a generated statement and return it in safe-to-execute form.
///
/// Checks run in a fixed order and the first failure rejects the statement.
pub fn validate(raw_sql: &str, policy: LimitPolicy) -> ValidationOutcome {
    match sanitize(raw_sql, policy) {
        Ok(sql) => ValidationOutcome::Sanitized(sql),
        Err(reason) => ValidationOutcome::Rejected(reason),
    }
}

fn sanitize(raw_sql: &str, policy: LimitPolicy) -> Result<String, DenialReason> {
    let sql = strip_terminators(raw_sql);
    if sql.is_empty() {
        return Err(deny(DenialKind::Empty, "empty sql"));
    }
    if sql.contains(';') {
        return Err(deny(DenialKind::MultipleStatements, "multiple statements are not allowed"));
    }

    let lower = sql.to_lowercase();
    if lower.contains("--") || lower.contains("/*") || lower.contains("*/") {
        return Err(deny(DenialKind::Comment, "comments are not allowed"));
    }
    if !STATEMENT_KIND.is_match(sql) {
        return Err(deny(DenialKind::NotSelect, "only SELECT statements are allowed"));
    }
    if let Some(found) = FORBIDDEN_KEYWORD.find(sql) {
        return Err(deny(
            DenialKind::ForbiddenKeyword,
            format!("forbidden sql keyword detected: {}", found.as_str().to_lowercase()),
        ));
    }
    if let Some(object) = SYSTEM_OBJECTS.iter().find(|object| lower.contains(*object)) {
        return Err(deny(
            DenialKind::SystemObject,
            format!("system objects are forbidden: {}", object.trim_end_matches('_')),
        ));
    }

    let masked = mask_quoted(sql);
    check_comma_joins(&masked)?;
    check_relations(sql)?;
    check_structure(sql)?;
    enforce_limit(sql, &masked, policy)
}

fn deny(kind: DenialKind, detail: impl Into<String>) -> DenialReason {
    DenialReason {
        kind,
        detail: detail.into(),
    }
}

fn strip_terminators(raw: &str) -> &str {
    let mut sql = raw.trim();
    while let Some(rest) = sql.strip_suffix(';') {
        sql = rest.trim_end();
    }
    sql
}

/// Blank the contents of string literals and quoted identifiers.
///
/// Byte offsets are preserved so positions found in the masked text apply to
/// the unmasked statement.
fn mask_quoted(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut closing: Option<u8> = None;
    for &b in bytes {
        match closing {
            Some(close) if b == close => {
                closing = None;
                out.push(b);
            }
            Some(_) => out.push(b' '),
            None => {
                closing = match b {
                    b'\'' => Some(b'\''),
                    b'"' => Some(b'"'),
                    b'`' => Some(b'`'),
                    b'[' => Some(b']'),
                    _ => None,
                };
                out.push(b);
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Reject `FROM a, b`. Only commas at the FROM clause's own nesting level
/// count; subqueries and function arguments are skipped.
fn check_comma_joins(masked: &str) -> Result<(), DenialReason> {
    let bytes = masked.as_bytes();
    for from in FROM_KEYWORD.find_iter(masked) {
        let mut depth = 0usize;
        let mut i = from.end();
        while i < bytes.len() {
            let b = bytes[i];
            match b {
                b'(' => depth += 1,
                b')' if depth == 0 => break,
                b')' => depth -= 1,
                b',' if depth == 0 => {
                    return Err(deny(
                        DenialKind::CommaJoin,
                        "comma joins are not allowed, use explicit JOIN",
                    ));
                }
                _ if depth == 0 && is_word_byte(b) && (i == 0 || !is_word_byte(bytes[i - 1])) => {
                    let end = bytes[i..]
                        .iter()
                        .position(|&c| !is_word_byte(c))
                        .map_or(bytes.len(), |n| i + n);
                    let word = masked[i..end].to_ascii_lowercase();
                    if FROM_TERMINATORS.contains(&word.as_str()) {
                        break;
                    }
                    i = end;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
    }
    Ok(())
}

/// Every FROM/JOIN target must be a catalog view or a CTE defined earlier in
/// the statement.
fn check_relations(sql: &str) -> Result<(), DenialReason> {
    let ctes: Vec<(String, usize)> = CTE_NAME
        .captures_iter(sql)
        .filter_map(|caps| {
            let name = caps.get(1)?;
            let normalized = normalize_identifier(name.as_str());
            (!normalized.is_empty()).then_some((normalized, name.start()))
        })
        .collect();

    for caps in FROM_JOIN.captures_iter(sql) {
        let Some(target) = caps.get(1) else {
            continue;
        };
        let table = normalize_identifier(target.as_str());
        if table.is_empty() || catalog::is_allowed(&table) {
            continue;
        }
        let defined_before = ctes
            .iter()
            .any(|(name, defined_at)| *name == table && *defined_at < target.start());
        if defined_before {
            continue;
        }
        return Err(deny(
            DenialKind::TableNotAllowed,
            format!("table or view \"{}\" is not allowed", table),
        ));
    }
    Ok(())
}

/// Strip quoting, lowercase and keep the final dot-separated segment.
pub fn normalize_identifier(raw: &str) -> String {
    let value = raw.trim();
    let last = value.rsplit('.').next().unwrap_or(value).trim();
    strip_identifier_quotes(last).trim().to_lowercase()
}

pub(crate) fn strip_identifier_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"')
            || (first == b'`' && last == b'`')
            || (first == b'[' && last == b']')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Parse with a real SQL grammar as a second opinion: exactly one query, no
/// SELECT INTO, no data-modifying bodies.
fn check_structure(sql: &str) -> Result<(), DenialReason> {
    let statements = Parser::parse_sql(&SQLiteDialect {}, sql).map_err(|e| {
        deny(
            DenialKind::ParseFailure,
            format!("cannot verify query safety: {}", e),
        )
    })?;

    let [statement] = statements.as_slice() else {
        return Err(deny(DenialKind::MultipleStatements, "multiple statements are not allowed"));
    };

    match statement {
        Statement::Query(query) if is_safe_query(query) => check_parsed_relations(statement),
        Statement::Query(_) => Err(deny(
            DenialKind::UnsafeQueryBody,
            "query contains SELECT INTO or a data-modifying clause",
        )),
        _ => Err(deny(DenialKind::NotSelect, "only SELECT statements are allowed")),
    }
}

/// Walk every table source in the parsed statement, subqueries included.
fn check_parsed_relations(statement: &Statement) -> Result<(), DenialReason> {
    let mut checker = RelationChecker::default();
    match statement.visit(&mut checker) {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(reason) => Err(reason),
    }
}

/// CTE names are scoped to the query that defines them.
#[derive(Default)]
struct RelationChecker {
    ctes: Vec<String>,
    scopes: Vec<usize>,
}

impl Visitor for RelationChecker {
    type Break = DenialReason;

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<DenialReason> {
        self.scopes.push(self.ctes.len());
        if let Some(with) = &query.with {
            self.ctes.extend(
                with.cte_tables
                    .iter()
                    .map(|cte| cte.alias.name.value.to_lowercase()),
            );
        }
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<DenialReason> {
        if let Some(mark) = self.scopes.pop() {
            self.ctes.truncate(mark);
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<DenialReason> {
        let table = normalize_identifier(&relation.to_string());
        if catalog::is_allowed(&table) || self.ctes.contains(&table) {
            return ControlFlow::Continue(());
        }
        ControlFlow::Break(deny(
            DenialKind::TableNotAllowed,
            format!("table or view \"{}\" is not allowed", table),
        ))
    }

    fn pre_visit_table_factor(&mut self, factor: &TableFactor) -> ControlFlow<DenialReason> {
        match factor {
            TableFactor::Table { args: None, .. }
            | TableFactor::Derived { .. }
            | TableFactor::NestedJoin { .. } => ControlFlow::Continue(()),
            other => ControlFlow::Break(deny(
                DenialKind::TableNotAllowed,
                format!("unsupported table source: {}", other),
            )),
        }
    }
}

fn is_safe_query(query: &Query) -> bool {
    let ctes_safe = query
        .with
        .as_ref()
        .is_none_or(|with| with.cte_tables.iter().all(|cte| is_safe_query(&cte.query)));
    ctes_safe && is_safe_query_body(&query.body)
}

fn is_safe_query_body(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => is_safe_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_safe_query_body(left) && is_safe_query_body(right)
        }
        SetExpr::Values(_) => true,
        _ => false,
    }
}

/// Append, keep or clamp the statement's top-level LIMIT.
fn enforce_limit(sql: &str, masked: &str, policy: LimitPolicy) -> Result<String, DenialReason> {
    if policy.is_unbounded() {
        return Ok(sql.to_string());
    }

    let Some(keyword_end) = top_level_limit(masked) else {
        return Ok(format!("{} LIMIT {}", sql, policy.max_rows));
    };

    let operand = &sql[keyword_end..];
    let invalid = || deny(DenialKind::InvalidLimit, "invalid LIMIT value");
    let caps = LIMIT_OPERAND.captures(operand).ok_or_else(invalid)?;
    let whole = caps.get(0).ok_or_else(invalid)?;
    if operand[whole.end()..]
        .bytes()
        .next()
        .is_some_and(|b| is_word_byte(b) || b == b'.')
    {
        return Err(invalid());
    }

    // `LIMIT offset, count` caps the second number.
    let count = caps.get(2).or_else(|| caps.get(1)).ok_or_else(invalid)?;
    let within = count
        .as_str()
        .parse::<u64>()
        .is_ok_and(|value| value <= policy.max_rows as u64);
    if within {
        return Ok(sql.to_string());
    }

    let start = keyword_end + count.start();
    let end = keyword_end + count.end();
    Ok(format!("{}{}{}", &sql[..start], policy.max_rows, &sql[end..]))
}

/// End offset of the last LIMIT keyword outside any parentheses.
fn top_level_limit(masked: &str) -> Option<usize> {
    let bytes = masked.as_bytes();
    let mut depth: i64 = 0;
    let mut scanned = 0;
    let mut found = None;
    for m in LIMIT_KEYWORD.find_iter(masked) {
        for &b in &bytes[scanned..m.start()] {
            match b {
                b'(' => depth += 1,
                b')' => depth -= 1,
                _ => {}
            }
        }
        scanned = m.start();
        if depth == 0 {
            found = Some(m.end());
        }
    }
    found
}

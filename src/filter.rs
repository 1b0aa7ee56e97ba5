use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

/// Matches values that should be coerced to a JSON number. Anything that
/// fails this gate is kept as a verbatim string.
static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("numeric pattern is valid"));

/// FilterOp
///
/// The comparison operators accepted in ad-hoc query strings. Clause
/// evaluation against stored documents lives in the store layer; this module
/// only classifies and parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Operator lookup table, most specific first. The two-character operators
/// must be tested before their one-character prefixes so that `age>=18`
/// classifies as `>=` and never as `=` or `>`.
const OPERATORS: [(&str, FilterOp); 6] = [
    (">=", FilterOp::Gte),
    ("<=", FilterOp::Lte),
    ("!=", FilterOp::Ne),
    ("=", FilterOp::Eq),
    (">", FilterOp::Gt),
    ("<", FilterOp::Lt),
];

/// FilterClause
///
/// A single `field operator value` constraint. Multiple clauses combine with
/// implicit AND.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterClause {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl FilterClause {
    pub fn new(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Exact-match clause, the building block for `_id` lookups.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, FilterOp::Eq, value)
    }
}

/// Pagination window derived from the `from`/`to` request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: i64,
    pub limit: i64,
}

/// FindOptions
///
/// Optional projection and pagination applied to a list query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Field names to keep in each returned document. `None` returns the
    /// whole document.
    pub fields: Option<Vec<String>>,
    pub page: Option<Page>,
}

/// parse_query
///
/// Translates a comma-separated clause string (e.g. `"age>=18,status=active"`)
/// into a clause list. Clauses are keyed by field with map-put semantics: a
/// later clause on the same field replaces the earlier one in place, so only
/// one operator per field survives.
///
/// Operator resolution is longest-operator-wins: `>=`, `<=` and `!=` are
/// tested before `=`, `>` and `<`, and the first hit is final. A candidate
/// with no recognized operator, or with nothing after the operator, is
/// dropped with a warning rather than reported to the caller.
pub fn parse_query(raw: &str) -> Vec<FilterClause> {
    let mut clauses: Vec<FilterClause> = Vec::new();
    for candidate in raw.split(',') {
        let Some(clause) = parse_clause(candidate) else {
            tracing::warn!(clause = candidate, "dropping unparseable filter clause");
            continue;
        };
        match clauses.iter().position(|c| c.field == clause.field) {
            Some(index) => clauses[index] = clause,
            None => clauses.push(clause),
        }
    }
    clauses
}

/// Parses one `field operator value` candidate, or `None` if no operator is
/// present or the value segment is missing.
fn parse_clause(candidate: &str) -> Option<FilterClause> {
    let (token, op) = OPERATORS
        .into_iter()
        .find(|(token, _)| candidate.contains(token))?;
    let (field, raw_value) = candidate.split_once(token)?;
    if raw_value.is_empty() {
        return None;
    }
    Some(FilterClause::new(field, op, coerce_value(raw_value)))
}

/// Numeric coercion: a raw value shaped like a signed decimal number becomes
/// a JSON number (f64); everything else stays a string. The regex gate runs
/// before the parse, so the parse cannot fail.
fn coerce_value(raw: &str) -> Value {
    if NUMERIC.is_match(raw) {
        let number: f64 = raw.parse().expect("gated by numeric pattern");
        Value::from(number)
    } else {
        Value::String(raw.to_string())
    }
}

/// parse_select
///
/// Splits the comma-separated projection parameter into field names.
pub fn parse_select(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}

/// parse_page
///
/// Pagination applies if and only if both `from` and `to` parse as integers:
/// `from` becomes the skip offset and `to` the window size. Either side
/// missing or non-numeric disables pagination entirely, never partially.
pub fn parse_page(from: Option<&str>, to: Option<&str>) -> Option<Page> {
    let skip: i64 = from?.parse().ok()?;
    let limit: i64 = to?.parse().ok()?;
    Some(Page { skip, limit })
}

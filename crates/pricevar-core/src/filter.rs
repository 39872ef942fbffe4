//! Filter builder: period tokens and entity filters → a typed predicate.
//!
//! The predicate renders to DuckDB SQL in one place ([`Predicate::to_sql`]),
//! so identifier quoting and literal escaping are never repeated at call
//! sites. The same tree can be evaluated in memory against a
//! [`TransactionRecord`].
//!
//! # Period rules
//!
//! Applied per token, in order, and combined with OR:
//!
//! 1. `{start, end}` pair → date range.
//! 2. `"<date> to <date>"` with ISO dates → date range.
//! 3. A token containing `q1`..`q4` → that quarter of the first 4-digit
//!    year found in it ("fy2025", "2025q3"), or of `default_year`.
//! 4. A bare 4-digit year → the whole calendar year.
//! 5. Anything else → `transactionDate >= recent_fallback_start`. This is
//!    deliberately lossy; the token is logged, never rejected.
//!
//! No tokens at all means "all time" ([`Predicate::True`]).

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::model::TransactionRecord;

/// Date column every period predicate constrains.
pub const DATE_COLUMN: &str = "transactionDate";

/// A text column a predicate can compare against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Column {
    SupplierName,
    ContractName,
    /// Any other dimension of the source table, by its column name.
    Dimension(String),
}

impl Column {
    pub fn name(&self) -> &str {
        match self {
            Column::SupplierName => "supplierName",
            Column::ContractName => "contractName",
            Column::Dimension(name) => name,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A boolean filter over transaction rows.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    True,
    /// Inclusive date range on [`DATE_COLUMN`].
    DateRange { start: NaiveDate, end: NaiveDate },
    /// `transactionDate >= date`.
    OnOrAfter(NaiveDate),
    Equals { column: Column, value: String },
    In { column: Column, values: Vec<String> },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction that drops `True` operands and collapses trivial cases.
    pub fn all(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts
            .into_iter()
            .filter(|p| !matches!(p, Predicate::True))
            .collect();
        match parts.len() {
            0 => Predicate::True,
            1 => parts.remove(0),
            _ => Predicate::And(parts),
        }
    }

    /// Disjunction. No operands means no constraint, so it yields `True`.
    pub fn any(parts: impl IntoIterator<Item = Predicate>) -> Predicate {
        let mut parts: Vec<Predicate> = parts.into_iter().collect();
        if parts.iter().any(|p| matches!(p, Predicate::True)) {
            return Predicate::True;
        }
        match parts.len() {
            0 => Predicate::True,
            1 => parts.remove(0),
            _ => Predicate::Or(parts),
        }
    }

    /// Render as a DuckDB boolean expression.
    pub fn to_sql(&self) -> String {
        match self {
            Predicate::True => "TRUE".to_string(),
            Predicate::DateRange { start, end } => format!(
                "({col} >= {start} AND {col} <= {end})",
                col = quote_ident(DATE_COLUMN),
                start = date_literal(*start),
                end = date_literal(*end),
            ),
            Predicate::OnOrAfter(date) => {
                format!("{} >= {}", quote_ident(DATE_COLUMN), date_literal(*date))
            }
            Predicate::Equals { column, value } => {
                format!("{} = {}", quote_ident(column.name()), quote_literal(value))
            }
            Predicate::In { column, values } => {
                if values.is_empty() {
                    return "FALSE".to_string();
                }
                let list: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
                format!("{} IN ({})", quote_ident(column.name()), list.join(", "))
            }
            Predicate::And(parts) => join_sql(parts, " AND "),
            Predicate::Or(parts) => join_sql(parts, " OR "),
        }
    }

    /// Evaluate against an in-memory record.
    ///
    /// `Dimension` columns are not carried by [`TransactionRecord`], so
    /// comparisons against them never match.
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        match self {
            Predicate::True => true,
            Predicate::DateRange { start, end } => {
                record.transaction_date >= *start && record.transaction_date <= *end
            }
            Predicate::OnOrAfter(date) => record.transaction_date >= *date,
            Predicate::Equals { column, value } => {
                text_value(record, column).is_some_and(|v| v == value)
            }
            Predicate::In { column, values } => {
                text_value(record, column).is_some_and(|v| values.iter().any(|x| x == v))
            }
            Predicate::And(parts) => parts.iter().all(|p| p.matches(record)),
            Predicate::Or(parts) => parts.iter().any(|p| p.matches(record)),
        }
    }
}

fn join_sql(parts: &[Predicate], sep: &str) -> String {
    let rendered: Vec<String> = parts.iter().map(Predicate::to_sql).collect();
    format!("({})", rendered.join(sep))
}

fn text_value<'a>(record: &'a TransactionRecord, column: &Column) -> Option<&'a str> {
    match column {
        Column::SupplierName => Some(&record.supplier_name),
        Column::ContractName => Some(&record.contract_name),
        Column::Dimension(_) => None,
    }
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn date_literal(date: NaiveDate) -> String {
    format!("DATE '{}'", date.format("%Y-%m-%d"))
}

// ── Time periods ──

/// One period descriptor supplied by the host platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeriodToken {
    Explicit { start: NaiveDate, end: NaiveDate },
    Text(String),
}

impl From<&str> for PeriodToken {
    fn from(s: &str) -> Self {
        PeriodToken::Text(s.to_string())
    }
}

impl fmt::Display for PeriodToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodToken::Explicit { start, end } => write!(f, "{start} to {end}"),
            PeriodToken::Text(s) => f.write_str(s),
        }
    }
}

/// Which rule resolved a period token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    Explicit,
    Range,
    Quarter { year: i32, quarter: u32 },
    Year(i32),
    /// Unrecognised token mapped to the recent-data predicate.
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPeriod {
    pub token: String,
    pub kind: PeriodKind,
    pub predicate: Predicate,
}

/// The combined time predicate plus how each token was read.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeFilter {
    pub periods: Vec<ResolvedPeriod>,
    pub predicate: Predicate,
}

impl TimeFilter {
    pub fn is_all_time(&self) -> bool {
        self.periods.is_empty()
    }

    /// Tokens that fell through to the recent-data fallback.
    pub fn unrecognized(&self) -> impl Iterator<Item = &str> {
        self.periods
            .iter()
            .filter(|p| p.kind == PeriodKind::Fallback)
            .map(|p| p.token.as_str())
    }
}

/// Build the time predicate for a list of period tokens. Never fails.
pub fn build_time_filter(periods: &[PeriodToken], config: &AnalysisConfig) -> TimeFilter {
    let resolved: Vec<ResolvedPeriod> = periods
        .iter()
        .map(|p| resolve_period(p, config))
        .collect();
    let predicate = Predicate::any(resolved.iter().map(|p| p.predicate.clone()));
    TimeFilter {
        periods: resolved,
        predicate,
    }
}

fn resolve_period(token: &PeriodToken, config: &AnalysisConfig) -> ResolvedPeriod {
    let (kind, predicate) = match token {
        PeriodToken::Explicit { start, end } => (
            PeriodKind::Explicit,
            Predicate::DateRange {
                start: *start,
                end: *end,
            },
        ),
        PeriodToken::Text(text) => resolve_text_period(text, config),
    };
    debug!(token = %token, ?kind, "resolved period");
    ResolvedPeriod {
        token: token.to_string(),
        kind,
        predicate,
    }
}

fn resolve_text_period(text: &str, config: &AnalysisConfig) -> (PeriodKind, Predicate) {
    let lower = text.trim().to_lowercase();

    if let Some((start, end)) = lower.split_once(" to ")
        && let (Some(start), Some(end)) = (parse_iso_date(start), parse_iso_date(end))
    {
        return (PeriodKind::Range, Predicate::DateRange { start, end });
    }

    if let Some(quarter) = find_quarter(&lower) {
        let year = find_year(&lower).unwrap_or(config.default_year);
        if let Some((start, end)) = quarter_bounds(year, quarter) {
            return (
                PeriodKind::Quarter { year, quarter },
                Predicate::DateRange { start, end },
            );
        }
    }

    if let Some(year) = parse_year(&lower)
        && let (Some(start), Some(end)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        )
    {
        return (PeriodKind::Year(year), Predicate::DateRange { start, end });
    }

    warn!(
        token = text,
        fallback_start = %config.recent_fallback_start,
        "unrecognised period token, using recent-data fallback"
    );
    (
        PeriodKind::Fallback,
        Predicate::OnOrAfter(config.recent_fallback_start),
    )
}

fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// First of `q1`..`q4` appearing anywhere in the token ("2025q3", "fy25-q2").
fn find_quarter(lower: &str) -> Option<u32> {
    (1..=4).find(|q| lower.contains(&format!("q{q}")))
}

/// First four-digit run that is a plausible year ("fy2025", "2025q3").
fn find_year(lower: &str) -> Option<i32> {
    lower
        .split(|c: char| !c.is_ascii_digit())
        .find_map(parse_year)
}

fn parse_year(word: &str) -> Option<i32> {
    if word.len() != 4 || !word.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let year: i32 = word.parse().ok()?;
    (1900..=2099).contains(&year).then_some(year)
}

fn quarter_bounds(year: i32, quarter: u32) -> Option<(NaiveDate, NaiveDate)> {
    let (start_month, end_month, end_day) = match quarter {
        1 => (1, 3, 31),
        2 => (4, 6, 30),
        3 => (7, 9, 30),
        4 => (10, 12, 31),
        _ => return None,
    };
    Some((
        NaiveDate::from_ymd_opt(year, start_month, 1)?,
        NaiveDate::from_ymd_opt(year, end_month, end_day)?,
    ))
}

// ── Entity filters ──

/// One filter expression from the host, either free text or a dimension filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterExpr {
    Dimension {
        dim: String,
        #[serde(default = "default_op")]
        op: String,
        val: Vec<String>,
    },
    Text(String),
}

fn default_op() -> String {
    "=".to_string()
}

impl FilterExpr {
    fn is_blank(&self) -> bool {
        match self {
            FilterExpr::Text(s) => {
                let s = s.trim();
                s.is_empty() || s.eq_ignore_ascii_case("none")
            }
            FilterExpr::Dimension { val, .. } => val.is_empty(),
        }
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::Text(s) => f.write_str(s),
            FilterExpr::Dimension { dim, op, val } => {
                write!(f, "{dim} {op} {}", val.join(", "))
            }
        }
    }
}

/// The `other_filters` argument: absent, one expression, or a list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "FilterInput")]
pub struct OtherFilters(pub Vec<FilterExpr>);

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterInput {
    Missing(()),
    One(FilterExpr),
    Many(Vec<FilterExpr>),
}

impl From<FilterInput> for OtherFilters {
    fn from(input: FilterInput) -> Self {
        let exprs = match input {
            FilterInput::Missing(()) => Vec::new(),
            FilterInput::One(e) => vec![e],
            FilterInput::Many(v) => v,
        };
        OtherFilters(exprs.into_iter().filter(|e| !e.is_blank()).collect())
    }
}

impl OtherFilters {
    pub fn text(s: &str) -> Self {
        FilterInput::One(FilterExpr::Text(s.to_string())).into()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(FilterExpr::is_blank)
    }

    /// Human-readable summary, `None` when nothing is filtered.
    pub fn display(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .0
            .iter()
            .filter(|e| !e.is_blank())
            .map(|e| e.to_string())
            .collect();
        Some(parts.join(", "))
    }
}

/// A filter resolved by the host platform to concrete column values.
#[derive(Debug, Clone, PartialEq)]
pub struct GroundedFilter {
    pub column: Column,
    pub values: Vec<String>,
}

/// Host capability that maps user wording ("western") onto stored values ("West Ops").
pub trait FilterGrounding: Send + Sync {
    fn ground(&self, filters: &OtherFilters) -> Vec<GroundedFilter>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityFilter {
    pub predicate: Predicate,
    pub warnings: Vec<String>,
}

/// Build the entity predicate.
///
/// Without a grounding capability, filters are not applied: the predicate is
/// `True` and a warning describes what was ignored. Literal string matching
/// is never attempted.
pub fn build_entity_filter(
    filters: &OtherFilters,
    grounding: Option<&dyn FilterGrounding>,
) -> EntityFilter {
    let Some(shown) = filters.display() else {
        return EntityFilter {
            predicate: Predicate::True,
            warnings: Vec::new(),
        };
    };

    let grounded = grounding.map(|g| g.ground(filters)).unwrap_or_default();
    let grounded: Vec<GroundedFilter> = grounded
        .into_iter()
        .filter(|g| !g.values.is_empty())
        .collect();

    if grounded.is_empty() {
        let reason = if grounding.is_some() {
            "could not be grounded to known values"
        } else {
            "require filter grounding, which is not available"
        };
        warn!(filters = %shown, "entity filters ignored: {reason}");
        return EntityFilter {
            predicate: Predicate::True,
            warnings: vec![format!(
                "Filters ignored ({shown}): {reason}; showing unfiltered data"
            )],
        };
    }

    let predicate = Predicate::all(grounded.into_iter().map(|g| Predicate::In {
        column: g.column,
        values: g.values,
    }));
    EntityFilter {
        predicate,
        warnings: Vec::new(),
    }
}

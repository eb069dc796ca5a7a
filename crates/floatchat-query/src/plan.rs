//! Plan parsing and sanitization.
//!
//! The planning model is asked for a JSON list of calls such as
//!
//! ```text
//! [{"function": "byDateRange", "args": {"start_date": "2022-08-01", "end_date": "2022-08-31"}},
//!  {"function": "byTemperatureRange", "args": {"temp_min": 25}}]
//! ```
//!
//! but in practice it wraps the list in prose or a fenced block, emits Python
//! `None`, quotes numbers, or invents operations. [`parse_plan`] recovers the
//! first usable JSON literal and turns it into a typed [`Plan`]; calls to
//! unknown operations are dropped.

use std::fmt;
use std::sync::OnceLock;

use chrono::NaiveDate;
use floatchat_store::RegionBounds;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_TEMP_MIN: f64 = -5.0;
pub const DEFAULT_TEMP_MAX: f64 = 40.0;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanParseError {
    #[error("no JSON list or object found in the text")]
    NoJson,
    #[error("invalid JSON format: {0}")]
    InvalidJson(String),
    #[error("extracted JSON is neither a list nor an object")]
    NotListOrObject,
    #[error("invalid arguments for {operation}: {reason}")]
    InvalidArguments {
        operation: OperationKind,
        reason: String,
    },
}

// ============================================================================
// Operations
// ============================================================================

/// The closed set of operations a plan may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    #[serde(rename = "byTemperatureRange")]
    ByTemperatureRange,
    #[serde(rename = "byRegion")]
    ByRegion,
    #[serde(rename = "byDateRange")]
    ByDateRange,
    #[serde(rename = "byId")]
    ById,
}

impl OperationKind {
    pub const ALL: [OperationKind; 4] = [
        OperationKind::ByTemperatureRange,
        OperationKind::ByRegion,
        OperationKind::ByDateRange,
        OperationKind::ById,
    ];

    /// Accepts the short names and the older `get_profile(s)_by_*` names.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "byTemperatureRange" | "get_profiles_by_temperature_range" => {
                Some(OperationKind::ByTemperatureRange)
            }
            "byRegion" | "get_profiles_by_region" => Some(OperationKind::ByRegion),
            "byDateRange" | "get_profiles_by_date_range" => Some(OperationKind::ByDateRange),
            "byId" | "get_profile_by_id" => Some(OperationKind::ById),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::ByTemperatureRange => "byTemperatureRange",
            OperationKind::ByRegion => "byRegion",
            OperationKind::ByDateRange => "byDateRange",
            OperationKind::ById => "byId",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sanitized call with typed arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "function", content = "args")]
pub enum Operation {
    #[serde(rename = "byTemperatureRange")]
    ByTemperatureRange { temp_min: f64, temp_max: f64 },
    #[serde(rename = "byRegion")]
    ByRegion(RegionBounds),
    #[serde(rename = "byDateRange")]
    ByDateRange {
        start_date: NaiveDate,
        end_date: NaiveDate,
    },
    #[serde(rename = "byId")]
    ById { profile_id: i64 },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::ByTemperatureRange { .. } => OperationKind::ByTemperatureRange,
            Operation::ByRegion(_) => OperationKind::ByRegion,
            Operation::ByDateRange { .. } => OperationKind::ByDateRange,
            Operation::ById { .. } => OperationKind::ById,
        }
    }
}

/// Ordered operations. Position 0 seeds from the store, the rest filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    operations: Vec<Operation>,
}

impl Plan {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Operation> {
        self.operations.iter()
    }
}

impl FromIterator<Operation> for Plan {
    fn from_iter<I: IntoIterator<Item = Operation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Sanitization result plus what was thrown away, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanReport {
    pub plan: Plan,
    pub dropped: Vec<String>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Extract, normalize, parse, and sanitize raw planning-model output.
pub fn parse_plan(raw: &str) -> Result<Plan, PlanParseError> {
    parse_plan_report(raw).map(|report| report.plan)
}

pub fn parse_plan_report(raw: &str) -> Result<PlanReport, PlanParseError> {
    let calls = extract_json(raw)?;
    sanitize(calls)
}

/// Locate the JSON literal in `raw` and return it as a list of call values.
///
/// A fenced code block wins when present. Otherwise every `[`/`{` is tried in
/// order and the first balanced span holding a call object is used; a list
/// without objects is only taken when nothing better follows. A lone object
/// is promoted to a one-element list.
pub fn extract_json(raw: &str) -> Result<Vec<Value>, PlanParseError> {
    let value = match fenced_block(raw) {
        Some(block) => parse_candidate(block)?,
        None => first_bracketed_value(raw)?,
    };
    match value {
        Value::Array(items) => Ok(items),
        obj @ Value::Object(_) => Ok(vec![obj]),
        _ => Err(PlanParseError::NotListOrObject),
    }
}

fn fenced_block(raw: &str) -> Option<&str> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let re = FENCE.get_or_init(|| {
        Regex::new(r"```[\w+-]*[ \t]*\r?\n?([\s\S]*?)```").expect("fence regex is valid")
    });
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

fn first_bracketed_value(raw: &str) -> Result<Value, PlanParseError> {
    let mut first_error = None;
    let mut fallback = None;
    for (start, _) in raw.match_indices(['[', '{']) {
        let Some(candidate) = balanced_span(&raw[start..]) else {
            continue;
        };
        match parse_candidate(candidate) {
            Ok(value @ Value::Object(_)) => return Ok(value),
            Ok(Value::Array(items)) if items.iter().any(Value::is_object) => {
                return Ok(Value::Array(items));
            }
            Ok(value @ Value::Array(_)) => {
                fallback.get_or_insert(value);
            }
            Ok(_) => {}
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }
    fallback.ok_or(first_error.unwrap_or(PlanParseError::NoJson))
}

/// The prefix of `text` (which starts with `[` or `{`) up to its matching
/// closer, skipping brackets inside string literals.
fn balanced_span(text: &str) -> Option<&str> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' => stack.push(']'),
            '{' => stack.push('}'),
            ']' | '}' => {
                if stack.pop() != Some(ch) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(&text[..=idx]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_candidate(candidate: &str) -> Result<Value, PlanParseError> {
    if candidate.is_empty() {
        return Err(PlanParseError::NoJson);
    }
    let normalized = normalize_none(candidate);
    serde_json::from_str(&normalized).map_err(|e| PlanParseError::InvalidJson(e.to_string()))
}

/// Rewrite bare `None` tokens to `null`. String contents are left alone.
pub fn normalize_none(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape = false;
    let mut prev: Option<char> = None;
    let mut rest = text;

    while let Some(ch) = rest.chars().next() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
        } else if rest.starts_with("None")
            && !prev.is_some_and(is_ident_char)
            && !rest[4..].chars().next().is_some_and(is_ident_char)
        {
            out.push_str("null");
            rest = &rest[4..];
            prev = Some('e');
            continue;
        }
        out.push(ch);
        prev = Some(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ============================================================================
// Sanitization
// ============================================================================

/// Turn raw call values into a typed plan.
///
/// Calls that are not objects or that name an unknown operation are dropped
/// and logged. Missing temperature bounds fall back to the ocean defaults.
/// Missing or malformed required arguments of a known operation are an error.
pub fn sanitize(calls: Vec<Value>) -> Result<PlanReport, PlanParseError> {
    let mut operations = Vec::with_capacity(calls.len());
    let mut dropped = Vec::new();

    for call in calls {
        let call = match call {
            Value::Object(call) => call,
            other => {
                tracing::warn!(call = %other, "skipping plan entry that is not an object");
                dropped.push(other.to_string());
                continue;
            }
        };

        let name = call
            .get("function")
            .or_else(|| call.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let Some(kind) = OperationKind::parse(name) else {
            tracing::warn!(function = name, "skipping unsupported function");
            dropped.push(name.to_string());
            continue;
        };

        let empty = Map::new();
        let args = match call.get("args").or_else(|| call.get("arguments")) {
            Some(Value::Object(args)) => args,
            _ => &empty,
        };
        operations.push(typed_operation(kind, args)?);
    }

    if operations.is_empty() {
        tracing::debug!(dropped = dropped.len(), "plan is empty after sanitization");
    }
    Ok(PlanReport {
        plan: Plan::new(operations),
        dropped,
    })
}

fn typed_operation(kind: OperationKind, args: &Map<String, Value>) -> Result<Operation, PlanParseError> {
    let invalid = |reason: String| PlanParseError::InvalidArguments {
        operation: kind,
        reason,
    };

    let op = match kind {
        OperationKind::ByTemperatureRange => Operation::ByTemperatureRange {
            temp_min: optional_number(args, "temp_min")
                .map_err(invalid)?
                .unwrap_or(DEFAULT_TEMP_MIN),
            temp_max: optional_number(args, "temp_max")
                .map_err(invalid)?
                .unwrap_or(DEFAULT_TEMP_MAX),
        },
        OperationKind::ByRegion => Operation::ByRegion(RegionBounds {
            lat_min: required_number(args, "lat_min").map_err(invalid)?,
            lat_max: required_number(args, "lat_max").map_err(invalid)?,
            lon_min: required_number(args, "lon_min").map_err(invalid)?,
            lon_max: required_number(args, "lon_max").map_err(invalid)?,
        }),
        OperationKind::ByDateRange => Operation::ByDateRange {
            start_date: required_date(args, "start_date").map_err(invalid)?,
            end_date: required_date(args, "end_date").map_err(invalid)?,
        },
        OperationKind::ById => {
            let raw = present(args, "profile_id")
                .or_else(|| present(args, "id"))
                .ok_or_else(|| invalid("missing `profile_id`".to_string()))?;
            let profile_id =
                coerce_id(raw).ok_or_else(|| invalid(format!("`profile_id` is not an integer: {raw}")))?;
            Operation::ById { profile_id }
        }
    };
    Ok(op)
}

/// `null` counts as absent.
fn present<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    args.get(key).filter(|v| !v.is_null())
}

fn optional_number(args: &Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    match present(args, key) {
        None => Ok(None),
        Some(v) => coerce_number(v)
            .map(Some)
            .ok_or_else(|| format!("`{key}` is not a number: {v}")),
    }
}

fn required_number(args: &Map<String, Value>, key: &str) -> Result<f64, String> {
    optional_number(args, key)?.ok_or_else(|| format!("missing `{key}`"))
}

fn required_date(args: &Map<String, Value>, key: &str) -> Result<NaiveDate, String> {
    let v = present(args, key).ok_or_else(|| format!("missing `{key}`"))?;
    let text = v
        .as_str()
        .ok_or_else(|| format!("`{key}` is not a date string: {v}"))?
        .trim();
    // Accept full timestamps by keeping the calendar date.
    let day = text.get(..10).unwrap_or(text);
    NaiveDate::parse_from_str(day, DATE_FORMAT)
        .map_err(|e| format!("`{key}` is not a valid YYYY-MM-DD date ({text}): {e}"))
}

/// JSON number or numeric string.
pub fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Integer, integral float, or integer string.
pub fn coerce_id(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

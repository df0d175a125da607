use fhir::{DateRange, FhirDateTime, ResourceKind};

use crate::registry::{KindDefinition, ParamType, SearchParamDef};
use crate::{StoreError, StoreResult, ValidationError};

/// How a string parameter compares against indexed text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringMode {
    /// Case-insensitive prefix (the default).
    Prefix,
    /// Case-sensitive whole-value equality (`:exact`).
    Exact,
    /// Case-insensitive substring (`:contains`).
    Contains,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenSystem {
    /// `code`: any system.
    Any,
    /// `|code`: no system.
    Absent,
    /// `system|code` or `system|`.
    Exactly(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenValue {
    pub system: TokenSystem,
    /// `None` for `system|`, which matches any code in the system.
    pub code: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateComparator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateValue {
    pub comparator: DateComparator,
    pub range: DateRange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferenceValue {
    /// Resource type, when the value was given as `Type/id`.
    pub kind: Option<String>,
    pub id: String,
}

/// The typed form of one parameter. Values inside a predicate are OR-ed.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    String {
        mode: StringMode,
        values: Vec<String>,
    },
    Token(Vec<TokenValue>),
    Date(Vec<DateValue>),
    Reference(Vec<ReferenceValue>),
}

/// One resolved parameter.
#[derive(Clone, Debug)]
pub struct Clause {
    pub param: &'static SearchParamDef,
    pub predicate: Predicate,
}

/// A fully resolved search. Clauses are AND-ed.
#[derive(Clone, Debug)]
pub struct SearchQuery {
    pub kind: ResourceKind,
    pub clauses: Vec<Clause>,
    pub count: usize,
    pub offset: usize,
}

/// Resolve raw query parameters for `definition`.
///
/// # Arguments
///
/// * `definition` - Registry row of the searched kind.
/// * `params` - Parameters in request order; repeated names are AND-ed.
/// * `default_count` - Page size when `_count` is absent.
/// * `max_count` - Upper bound `_count` is clamped to.
///
/// # Errors
///
/// - [`StoreError::UnsupportedParameter`] for an unknown name or modifier.
/// - A schema violation (at the parameter name) for a value outside a token's value set, or
///   a malformed date, reference or paging number.
pub fn resolve(
    definition: &'static KindDefinition,
    params: &[(String, String)],
    default_count: usize,
    max_count: usize,
) -> StoreResult<SearchQuery> {
    let mut query = SearchQuery {
        kind: definition.kind,
        clauses: Vec::new(),
        count: default_count.min(max_count),
        offset: 0,
    };

    for (raw_name, raw_value) in params {
        match raw_name.as_str() {
            "_count" => query.count = parse_paging(raw_name, raw_value)?.min(max_count),
            "_offset" => query.offset = parse_paging(raw_name, raw_value)?,
            _ => {
                let (name, modifier) = match raw_name.split_once(':') {
                    Some((name, modifier)) => (name, Some(modifier)),
                    None => (raw_name.as_str(), None),
                };
                let unsupported = || StoreError::UnsupportedParameter {
                    kind: definition.kind,
                    name: raw_name.clone(),
                };
                let param = definition.search_param(name).ok_or_else(unsupported)?;

                let values: Vec<&str> = raw_value
                    .split(',')
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .collect();
                // An empty parameter value is ignored.
                if values.is_empty() {
                    if modifier.is_some() && param.param_type != ParamType::String {
                        return Err(unsupported());
                    }
                    continue;
                }

                let predicate = match (param.param_type, modifier) {
                    (ParamType::String, None) => string_predicate(StringMode::Prefix, &values),
                    (ParamType::String, Some("exact")) => {
                        string_predicate(StringMode::Exact, &values)
                    }
                    (ParamType::String, Some("contains")) => {
                        string_predicate(StringMode::Contains, &values)
                    }
                    (ParamType::Token, None) => token_predicate(param, &values)?,
                    (ParamType::Date, None) => date_predicate(param, &values)?,
                    (ParamType::Reference, None) => reference_predicate(param, &values)?,
                    (_, Some(_)) => return Err(unsupported()),
                };

                query.clauses.push(Clause { param, predicate });
            }
        }
    }

    Ok(query)
}

fn invalid(param: &str, message: String) -> StoreError {
    StoreError::Validation(ValidationError::schema(param, message))
}

fn parse_paging(name: &str, value: &str) -> StoreResult<usize> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| invalid(name, format!("'{value}' is not a non-negative integer")))
}

fn string_predicate(mode: StringMode, values: &[&str]) -> Predicate {
    let values = values
        .iter()
        .map(|v| match mode {
            StringMode::Exact => (*v).to_owned(),
            StringMode::Prefix | StringMode::Contains => v.to_lowercase(),
        })
        .collect();
    Predicate::String { mode, values }
}

fn token_predicate(param: &SearchParamDef, values: &[&str]) -> StoreResult<Predicate> {
    let tokens = values
        .iter()
        .map(|value| {
            let token = match value.split_once('|') {
                None => TokenValue {
                    system: TokenSystem::Any,
                    code: Some((*value).to_owned()),
                },
                Some(("", code)) => TokenValue {
                    system: TokenSystem::Absent,
                    code: non_empty(code),
                },
                Some((system, code)) => TokenValue {
                    system: TokenSystem::Exactly(system.to_owned()),
                    code: non_empty(code),
                },
            };

            if token.system == TokenSystem::Absent && token.code.is_none() {
                return Err(invalid(param.name, format!("'{value}' is not a valid token")));
            }
            if let (Some(domain), Some(code)) = (param.domain, token.code.as_deref()) {
                if !domain.contains(&code) {
                    return Err(invalid(
                        param.name,
                        format!("'{code}' is not one of {}", domain.join(", ")),
                    ));
                }
            }
            Ok(token)
        })
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(Predicate::Token(tokens))
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

fn date_predicate(param: &SearchParamDef, values: &[&str]) -> StoreResult<Predicate> {
    let dates = values
        .iter()
        .map(|value| {
            let (comparator, rest) = split_comparator(value);
            let date = FhirDateTime::parse(rest)
                .map_err(|e| invalid(param.name, e.to_string()))?;
            Ok(DateValue {
                comparator,
                range: date.range(),
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(Predicate::Date(dates))
}

fn split_comparator(value: &str) -> (DateComparator, &str) {
    const PREFIXES: [(&str, DateComparator); 6] = [
        ("eq", DateComparator::Eq),
        ("ne", DateComparator::Ne),
        ("gt", DateComparator::Gt),
        ("lt", DateComparator::Lt),
        ("ge", DateComparator::Ge),
        ("le", DateComparator::Le),
    ];
    PREFIXES
        .iter()
        .find_map(|(prefix, comparator)| value.strip_prefix(prefix).map(|rest| (*comparator, rest)))
        .unwrap_or((DateComparator::Eq, value))
}

fn reference_predicate(param: &SearchParamDef, values: &[&str]) -> StoreResult<Predicate> {
    let references = values
        .iter()
        .map(|value| {
            let (kind, id) = match value.split_once('/') {
                None => (None, *value),
                Some((kind, id)) => (Some(kind), id),
            };
            let well_formed = frs_types::ResourceId::parse(id).is_ok()
                && kind.map_or(true, |k| !k.is_empty() && k.bytes().all(|b| b.is_ascii_alphabetic()));
            if !well_formed {
                return Err(invalid(
                    param.name,
                    format!("'{value}' is not a reference of the form Type/id or id"),
                ));
            }
            Ok(ReferenceValue {
                kind: kind.map(str::to_owned),
                id: id.to_owned(),
            })
        })
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(Predicate::Reference(references))
}

//! Annotation filter.
//!
//! Decides whether this controller instance manages a given `Nginx`, by
//! evaluating a label-selector expression against the object's annotations.
//! Several operator deployments can then share one cluster, each owning the
//! `Nginx` objects its filter selects.
//!
//! Supported syntax (comma separated, all terms must match):
//! `key=value`, `key==value`, `key!=value`, `key in (a,b)`,
//! `key notin (a,b)`, `key`, `!key`.

use crate::error::ControllerError;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, annotations: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(k, v) => annotations.get(k) == Some(v),
            Requirement::NotEquals(k, v) => annotations.get(k) != Some(v),
            Requirement::In(k, values) => annotations.get(k).is_some_and(|a| values.contains(a)),
            Requirement::NotIn(k, values) => annotations.get(k).is_none_or(|a| !values.contains(a)),
            Requirement::Exists(k) => annotations.contains_key(k),
            Requirement::DoesNotExist(k) => !annotations.contains_key(k),
        }
    }
}

/// Parsed annotation filter. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationFilter {
    requirements: Vec<Requirement>,
}

impl AnnotationFilter {
    /// Parse a selector expression
    pub fn parse(expr: &str) -> Result<Self, ControllerError> {
        let requirements = split_terms(expr)?
            .into_iter()
            .map(|term| parse_term(&term))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { requirements })
    }

    /// True when no requirements are configured
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Whether an object with `annotations` should be managed
    pub fn matches(&self, annotations: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(annotations))
    }
}

/// Split on commas that are not inside a value set.
fn split_terms(expr: &str) -> Result<Vec<String>, ControllerError> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in expr.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    ControllerError::InvalidSelector(format!("unbalanced ')' in {expr:?}"))
                })?;
                current.push(c);
            }
            ',' if depth == 0 => terms.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if depth != 0 {
        return Err(ControllerError::InvalidSelector(format!("unbalanced '(' in {expr:?}")));
    }
    terms.push(current);

    Ok(terms
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

fn parse_term(term: &str) -> Result<Requirement, ControllerError> {
    if let Some(key) = term.strip_prefix('!') {
        return Ok(Requirement::DoesNotExist(valid_key(key.trim(), term)?));
    }
    if let Some((key, value)) = term.split_once("!=") {
        return Ok(Requirement::NotEquals(valid_key(key.trim(), term)?, value.trim().to_string()));
    }
    if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
        return Ok(Requirement::Equals(valid_key(key.trim(), term)?, value.trim().to_string()));
    }
    if term.contains('(') {
        let (key, rest) = term
            .split_once(char::is_whitespace)
            .ok_or_else(|| ControllerError::InvalidSelector(format!("missing operator in {term:?}")))?;
        let rest = rest.trim_start();
        let (negated, set) = if let Some(set) = rest.strip_prefix("notin") {
            (true, set)
        } else if let Some(set) = rest.strip_prefix("in") {
            (false, set)
        } else {
            return Err(ControllerError::InvalidSelector(format!("unknown operator in {term:?}")));
        };
        let values = parse_set(set.trim(), term)?;
        let key = valid_key(key, term)?;
        return Ok(if negated {
            Requirement::NotIn(key, values)
        } else {
            Requirement::In(key, values)
        });
    }
    Ok(Requirement::Exists(valid_key(term, term)?))
}

fn parse_set(set: &str, term: &str) -> Result<Vec<String>, ControllerError> {
    let inner = set
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| ControllerError::InvalidSelector(format!("malformed value set in {term:?}")))?;
    let values: Vec<String> = inner
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return Err(ControllerError::InvalidSelector(format!("empty value set in {term:?}")));
    }
    Ok(values)
}

fn valid_key(key: &str, term: &str) -> Result<String, ControllerError> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if ok {
        Ok(key.to_string())
    } else {
        Err(ControllerError::InvalidSelector(format!("invalid key {key:?} in {term:?}")))
    }
}

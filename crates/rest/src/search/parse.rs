//! Query string parsing and validation.
//!
//! Parsing turns ordered query pairs into [`SearchOptions`]:
//!
//! - `_include` is appended once per occurrence;
//! - `_count` must be a non-negative integer and is capped at the maximum
//!   page size;
//! - `_cursor` is kept opaque, `_format` is ignored;
//! - any other key is split into `name[:modifier]`, its value is split on
//!   unescaped commas into an OR-list, and repeated keys are AND-ed.
//!
//! Validation then drops (or, in strict mode, rejects) parameters and
//! includes the resource type does not declare.

use tracing::debug;

use super::params::{ParameterKey, ParameterValue, SearchCapabilities, SearchOptions, SearchPrefix};
use crate::error::{FhirError, FhirResult};

/// Query keys with engine-defined meaning.
pub const RESERVED_KEYS: [&str; 4] = ["_include", "_count", "_cursor", "_format"];

/// Page size limits applied while parsing `_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    /// Page size when `_count` is absent.
    pub default_count: usize,
    /// Largest page size honoured.
    pub max_count: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_count: 20,
            max_count: 1000,
        }
    }
}

/// Splits a value on commas not preceded by a backslash; `\,` becomes a
/// literal comma.
pub fn split_or_values(raw: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            ',' => values.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    values.push(current);
    values
}

/// Escapes commas in a literal so it survives [`split_or_values`].
pub fn escape_literal(literal: &str) -> String {
    literal.replace(',', "\\,")
}

fn parse_value(raw: String, accepts_prefix: bool) -> ParameterValue {
    if accepts_prefix {
        if let Some((prefix, literal)) = SearchPrefix::extract(&raw) {
            return ParameterValue::prefixed(prefix, literal);
        }
    }
    ParameterValue::new(raw)
}

fn parse_count(raw: &str, limits: &PageLimits) -> FhirResult<usize> {
    let count: usize = raw
        .trim()
        .parse()
        .map_err(|_| FhirError::invalid_request(format!("invalid _count value '{}'", raw)))?;
    Ok(count.min(limits.max_count))
}

/// Parses ordered query pairs into search options.
///
/// `capabilities` supplies parameter types so prefixes are only peeled for
/// number, date and quantity parameters.
pub fn parse_search(
    pairs: &[(String, String)],
    capabilities: &SearchCapabilities,
    limits: &PageLimits,
) -> FhirResult<SearchOptions> {
    let mut options = SearchOptions::new(limits.default_count.min(limits.max_count));

    for (key, value) in pairs {
        match key.as_str() {
            "_include" => {
                if !value.is_empty() {
                    options.includes.push(value.clone());
                }
            }
            "_count" => options.count = parse_count(value, limits)?,
            "_cursor" => {
                options.cursor = Some(value.clone()).filter(|c| !c.is_empty());
            }
            "_format" => {}
            _ => {
                let key = ParameterKey::parse(key);
                if key.name.is_empty() {
                    continue;
                }
                let accepts_prefix = capabilities
                    .param_type(&key.name)
                    .is_some_and(|t| t.accepts_prefix());
                let values: Vec<ParameterValue> = split_or_values(value)
                    .into_iter()
                    .filter(|v| !v.is_empty())
                    .map(|v| parse_value(v, accepts_prefix))
                    .collect();
                if values.is_empty() {
                    continue;
                }
                options.parameters.entry(key).or_default().push(values);
            }
        }
    }

    Ok(options)
}

/// Drops or rejects parameters and includes the type does not declare.
///
/// Each key is judged on its own: a declared key is kept with all of its
/// AND-ed occurrences, an undeclared one is dropped entirely (or rejected
/// when `strict`).
pub fn validate_search(
    mut options: SearchOptions,
    capabilities: &SearchCapabilities,
    strict: bool,
) -> FhirResult<SearchOptions> {
    let unsupported: Vec<ParameterKey> = options
        .parameters
        .keys()
        .filter(|key| !capabilities.parameters.contains_key(&key.name))
        .cloned()
        .collect();

    for key in unsupported {
        if strict {
            return Err(FhirError::invalid_request(format!(
                "unsupported search parameter: {}",
                key
            )));
        }
        debug!(parameter = %key, "Ignoring unsupported search parameter");
        options.parameters.remove(&key);
    }

    if strict {
        if let Some(include) = options
            .includes
            .iter()
            .find(|i| !capabilities.includes.contains(i))
        {
            return Err(FhirError::invalid_request(format!(
                "unsupported include: {}",
                include
            )));
        }
    } else {
        options.includes.retain(|include| {
            let declared = capabilities.includes.contains(include);
            if !declared {
                debug!(include = %include, "Ignoring unsupported include");
            }
            declared
        });
    }

    Ok(options)
}

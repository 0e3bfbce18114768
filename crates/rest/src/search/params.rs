//! Search parameter, option and result types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resource::Resource;

/// FHIR search parameter types.
///
/// See: https://hl7.org/fhir/R4/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system or value set.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite search parameter that combines others.
    Composite,
    /// Special search parameters.
    Special,
}

impl SearchParamType {
    /// Returns the FHIR code for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchParamType::String => "string",
            SearchParamType::Uri => "uri",
            SearchParamType::Number => "number",
            SearchParamType::Date => "date",
            SearchParamType::Quantity => "quantity",
            SearchParamType::Token => "token",
            SearchParamType::Reference => "reference",
            SearchParamType::Composite => "composite",
            SearchParamType::Special => "special",
        }
    }

    /// Returns true if values of this type may carry a comparison prefix.
    pub fn accepts_prefix(&self) -> bool {
        matches!(
            self,
            SearchParamType::Number | SearchParamType::Date | SearchParamType::Quantity
        )
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            "special" => Ok(SearchParamType::Special),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// Comparison prefixes for number, date and quantity parameters.
///
/// See: https://hl7.org/fhir/R4/search.html#prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
    /// Starts after.
    Sa,
    /// Ends before.
    Eb,
}

impl SearchPrefix {
    /// All recognised prefixes.
    pub const ALL: [SearchPrefix; 8] = [
        SearchPrefix::Eq,
        SearchPrefix::Ne,
        SearchPrefix::Gt,
        SearchPrefix::Lt,
        SearchPrefix::Ge,
        SearchPrefix::Le,
        SearchPrefix::Sa,
        SearchPrefix::Eb,
    ];

    /// Returns the two-character code.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchPrefix::Eq => "eq",
            SearchPrefix::Ne => "ne",
            SearchPrefix::Gt => "gt",
            SearchPrefix::Lt => "lt",
            SearchPrefix::Ge => "ge",
            SearchPrefix::Le => "le",
            SearchPrefix::Sa => "sa",
            SearchPrefix::Eb => "eb",
        }
    }

    /// Splits a prefix off the front of a value.
    ///
    /// Returns `None` unless the value starts with one of the eight codes
    /// and a non-empty literal remains.
    pub fn extract(value: &str) -> Option<(Self, &str)> {
        let head = value.get(..2)?;
        let rest = &value[2..];
        if rest.is_empty() {
            return None;
        }
        let prefix = head.parse().ok()?;
        Some((prefix, rest))
    }
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SearchPrefix::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown search prefix: {}", s))
    }
}

/// A search parameter key: its name plus an optional modifier.
///
/// Keys order by name, then modifier (unmodified first).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParameterKey {
    /// The parameter name (e.g. `date`).
    pub name: String,
    /// The modifier (e.g. `above`), if any.
    pub modifier: Option<String>,
}

impl ParameterKey {
    /// Creates an unmodified key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifier: None,
        }
    }

    /// Creates a key with a modifier.
    pub fn with_modifier(name: impl Into<String>, modifier: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifier: Some(modifier.into()),
        }
    }

    /// Parses `name` or `name:modifier`. An empty modifier is treated as none.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((name, modifier)) if !modifier.is_empty() => Self::with_modifier(name, modifier),
            Some((name, _)) => Self::new(name),
            None => Self::new(raw),
        }
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.modifier {
            Some(modifier) => write!(f, "{}:{}", self.name, modifier),
            None => f.write_str(&self.name),
        }
    }
}

/// A single search value with an optional comparison prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterValue {
    /// The comparison prefix, if one was given.
    pub prefix: Option<SearchPrefix>,
    /// The literal value.
    pub value: String,
}

impl ParameterValue {
    /// Creates an unprefixed value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            prefix: None,
            value: value.into(),
        }
    }

    /// Creates a prefixed value.
    pub fn prefixed(prefix: SearchPrefix, value: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix),
            value: value.into(),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.prefix {
            Some(prefix) => write!(f, "{}{}", prefix, self.value),
            None => f.write_str(&self.value),
        }
    }
}

/// Values separated by commas in one query occurrence; any may match.
pub type OrList = Vec<ParameterValue>;

/// Repeated occurrences of one key; all must match.
pub type AllOf = Vec<OrList>;

/// Parsed and validated search options passed to a backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOptions {
    /// Parameters keyed by name and modifier.
    pub parameters: BTreeMap<ParameterKey, AllOf>,
    /// `_include` values, in request order.
    pub includes: Vec<String>,
    /// Opaque continuation cursor.
    pub cursor: Option<String>,
    /// Page size.
    pub count: usize,
}

impl SearchOptions {
    /// Creates empty options with the given page size.
    pub fn new(count: usize) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }

    /// Adds one AND-ed occurrence of a parameter.
    pub fn with_parameter(mut self, key: ParameterKey, values: OrList) -> Self {
        self.parameters.entry(key).or_default().push(values);
        self
    }

    /// Adds an include.
    pub fn with_include(mut self, include: impl Into<String>) -> Self {
        self.includes.push(include.into());
        self
    }

    /// Returns a copy of these options with a different cursor.
    pub fn with_cursor(&self, cursor: Option<String>) -> Self {
        Self {
            cursor,
            ..self.clone()
        }
    }

    /// Returns every AND-ed occurrence of an unmodified parameter.
    pub fn get(&self, name: &str) -> Option<&AllOf> {
        self.parameters.get(&ParameterKey::new(name))
    }
}

/// Description of one declared search parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParameterDesc {
    /// The parameter type.
    pub param_type: SearchParamType,
    /// Modifiers the backend understands for this parameter.
    pub modifiers: Vec<String>,
}

/// The search parameters and includes a backend supports for one type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchCapabilities {
    /// Declared parameters by name.
    pub parameters: BTreeMap<String, SearchParameterDesc>,
    /// Declared `_include` values.
    pub includes: Vec<String>,
}

impl SearchCapabilities {
    /// Creates an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter without modifiers.
    pub fn parameter(self, name: impl Into<String>, param_type: SearchParamType) -> Self {
        self.parameter_with_modifiers(name, param_type, &[])
    }

    /// Declares a parameter together with its supported modifiers.
    pub fn parameter_with_modifiers(
        mut self,
        name: impl Into<String>,
        param_type: SearchParamType,
        modifiers: &[&str],
    ) -> Self {
        self.parameters.insert(
            name.into(),
            SearchParameterDesc {
                param_type,
                modifiers: modifiers.iter().map(|m| m.to_string()).collect(),
            },
        );
        self
    }

    /// Declares an include.
    pub fn include(mut self, include: impl Into<String>) -> Self {
        self.includes.push(include.into());
        self
    }

    /// Returns the declared type of a parameter.
    pub fn param_type(&self, name: &str) -> Option<SearchParamType> {
        self.parameters.get(name).map(|desc| desc.param_type)
    }

    /// Returns true if the key may appear in links: it is declared and either
    /// unmodified or carrying a declared modifier.
    pub fn allows_key(&self, key: &ParameterKey) -> bool {
        match (self.parameters.get(&key.name), &key.modifier) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(desc), Some(modifier)) => desc.modifiers.iter().any(|m| m == modifier),
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    /// Matching resources.
    pub resources: Vec<Resource>,
    /// Resources pulled in by `_include`.
    pub included: Vec<Resource>,
    /// Cursor for the next page; `None` on the last page.
    pub next: Option<String>,
}

impl SearchResult {
    /// Creates a terminal page.
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            resources,
            ..Default::default()
        }
    }

    /// Sets the continuation cursor.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Sets included resources.
    pub fn with_included(mut self, included: Vec<Resource>) -> Self {
        self.included = included;
        self
    }

    /// Returns true if there is no next page.
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_extract() {
        for prefix in SearchPrefix::ALL {
            let raw = format!("{}2024-01-01", prefix);
            assert_eq!(
                SearchPrefix::extract(&raw),
                Some((prefix, "2024-01-01")),
                "prefix {}",
                prefix
            );
        }
    }

    #[test]
    fn test_prefix_extract_requires_literal() {
        assert_eq!(SearchPrefix::extract("ge"), None);
        assert_eq!(SearchPrefix::extract("ap5"), None);
        assert_eq!(SearchPrefix::extract("5"), None);
        assert_eq!(SearchPrefix::extract("é5"), None);
    }

    #[test]
    fn test_parameter_key_parse() {
        assert_eq!(ParameterKey::parse("date"), ParameterKey::new("date"));
        assert_eq!(
            ParameterKey::parse("code:above"),
            ParameterKey::with_modifier("code", "above")
        );
        assert_eq!(ParameterKey::parse("name:"), ParameterKey::new("name"));
    }

    #[test]
    fn test_parameter_key_order() {
        let mut keys = vec![
            ParameterKey::with_modifier("name", "exact"),
            ParameterKey::new("birthdate"),
            ParameterKey::new("name"),
        ];
        keys.sort();
        assert_eq!(
            keys.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            vec!["birthdate", "name", "name:exact"]
        );
    }

    #[test]
    fn test_allows_key() {
        let caps = SearchCapabilities::new()
            .parameter_with_modifiers("code", SearchParamType::Token, &["above"])
            .parameter("date", SearchParamType::Date);

        assert!(caps.allows_key(&ParameterKey::new("code")));
        assert!(caps.allows_key(&ParameterKey::with_modifier("code", "above")));
        assert!(!caps.allows_key(&ParameterKey::with_modifier("code", "below")));
        assert!(!caps.allows_key(&ParameterKey::with_modifier("date", "missing")));
        assert!(!caps.allows_key(&ParameterKey::new("status")));
    }

    #[test]
    fn test_with_cursor_keeps_parameters() {
        let options = SearchOptions::new(10)
            .with_parameter(ParameterKey::new("_id"), vec![ParameterValue::new("a")])
            .with_include("Patient:organization");
        let next = options.with_cursor(Some("20".to_string()));

        assert_eq!(next.cursor.as_deref(), Some("20"));
        assert_eq!(next.parameters, options.parameters);
        assert_eq!(next.includes, options.includes);
        assert_eq!(next.count, 10);
        assert!(options.cursor.is_none());
    }

    #[test]
    fn test_value_display() {
        assert_eq!(
            ParameterValue::prefixed(SearchPrefix::Ge, "2024").to_string(),
            "ge2024"
        );
        assert_eq!(ParameterValue::new("x").to_string(), "x");
    }
}

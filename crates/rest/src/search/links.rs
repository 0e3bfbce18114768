//! Self and next link construction for searchset bundles.
//!
//! Links reproduce the parameters that were actually used, sorted by name
//! then modifier, followed by `_include`, `_count` and `_cursor`. A parameter
//! carrying a modifier the type does not declare is left out of the link
//! (it still took part in the search).

use url::form_urlencoded::byte_serialize;

use super::params::{OrList, ParameterKey, SearchCapabilities, SearchOptions};
use super::parse::escape_literal;

fn encode(raw: &str) -> String {
    byte_serialize(raw.as_bytes()).collect()
}

fn encode_or_list(values: &OrList) -> String {
    values
        .iter()
        .map(|v| encode(&escape_literal(&v.to_string())))
        .collect::<Vec<_>>()
        .join(",")
}

/// Builds the query string for a search, using `cursor` in place of the
/// options' own cursor.
pub fn query_string(
    options: &SearchOptions,
    capabilities: &SearchCapabilities,
    cursor: Option<&str>,
) -> String {
    build_query(options, cursor, |key| capabilities.allows_key(key))
}

/// Builds the query string a client sends for `options`, keeping every
/// parameter.
pub fn request_query(options: &SearchOptions) -> String {
    build_query(options, options.cursor.as_deref(), |_| true)
}

fn build_query(
    options: &SearchOptions,
    cursor: Option<&str>,
    keep: impl Fn(&ParameterKey) -> bool,
) -> String {
    let mut parts = Vec::new();

    for (key, all_of) in &options.parameters {
        if !keep(key) {
            continue;
        }
        let name = match &key.modifier {
            Some(modifier) => format!("{}:{}", encode(&key.name), encode(modifier)),
            None => encode(&key.name),
        };
        for or_list in all_of {
            parts.push(format!("{}={}", name, encode_or_list(or_list)));
        }
    }

    for include in &options.includes {
        parts.push(format!("_include={}", encode(include)));
    }

    parts.push(format!("_count={}", options.count));

    if let Some(cursor) = cursor {
        parts.push(format!("_cursor={}", encode(cursor)));
    }

    parts.join("&")
}

fn search_url(base_url: &str, resource_type: &str, query: &str) -> String {
    format!("{}/{}?{}", base_url.trim_end_matches('/'), resource_type, query)
}

/// Builds the `self` link for a search.
pub fn self_link(
    base_url: &str,
    resource_type: &str,
    options: &SearchOptions,
    capabilities: &SearchCapabilities,
) -> String {
    let query = query_string(options, capabilities, options.cursor.as_deref());
    search_url(base_url, resource_type, &query)
}

/// Builds the `next` link for a search, substituting the next cursor.
pub fn next_link(
    base_url: &str,
    resource_type: &str,
    options: &SearchOptions,
    capabilities: &SearchCapabilities,
    next_cursor: &str,
) -> String {
    let next = options.with_cursor(Some(next_cursor.to_string()));
    self_link(base_url, resource_type, &next, capabilities)
}

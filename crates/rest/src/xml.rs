//! Generic FHIR JSON ⇄ XML bridge.
//!
//! Works on untyped JSON, following the FHIR XML representation rules:
//!
//! - primitives become `<name value="..."/>`; their `_name` companion
//!   contributes an `id` attribute and `extension` children;
//! - element ids and extension urls are attributes;
//! - contained resources (and `Bundle.entry.resource` and the like) are
//!   wrapped in an element named after the resource type;
//! - narrative `div` elements are passed through as raw XHTML.
//!
//! Without a schema, decoding is heuristic: repeated elements and a fixed
//! list of known list-valued names (some only under a given parent) become
//! arrays, `true`/`false` become booleans and a fixed list of
//! integer/decimal names become numbers.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use serde_json::{Map, Value};
use thiserror::Error;

/// FHIR namespace URI.
pub const FHIR_NAMESPACE: &str = "http://hl7.org/fhir";

/// Errors raised by the XML bridge.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The document is not well-formed XML.
    #[error("XML parse error: {0}")]
    Parse(String),
    /// The document or value does not have the shape of a FHIR resource.
    #[error("invalid FHIR XML: {0}")]
    Structure(String),
    /// Writing the document failed.
    #[error("XML write error: {0}")]
    Write(String),
}

/// Element names that are decoded as arrays under any parent.
const ARRAY_ELEMENTS: &[&str] = &[
    "address",
    "category",
    "coding",
    "communication",
    "component",
    "contact",
    "contained",
    "entry",
    "expression",
    "extension",
    "format",
    "given",
    "identifier",
    "interaction",
    "issue",
    "line",
    "link",
    "modifierExtension",
    "note",
    "operation",
    "parameter",
    "part",
    "performer",
    "prefix",
    "profile",
    "resource",
    "rest",
    "searchInclude",
    "searchParam",
    "security",
    "suffix",
    "tag",
    "telecom",
];

/// `(parent, child)` pairs that are arrays only under that parent; `name`
/// is a `HumanName` list on person-like resources and a plain string
/// everywhere else.
const PARENT_ARRAY_ELEMENTS: &[(&str, &str)] = &[
    ("Patient", "name"),
    ("Person", "name"),
    ("Practitioner", "name"),
    ("RelatedPerson", "name"),
];

fn is_array_element(parent: &str, name: &str) -> bool {
    ARRAY_ELEMENTS.contains(&name)
        || PARENT_ARRAY_ELEMENTS
            .iter()
            .any(|(p, child)| *p == parent && *child == name)
}

/// Element names whose values are decoded as numbers.
const NUMERIC_ELEMENTS: &[&str] = &[
    "count",
    "factor",
    "min",
    "multipleBirthInteger",
    "numberOfInstances",
    "numberOfSeries",
    "rank",
    "sequence",
    "total",
    "valueDecimal",
    "valueInteger",
    "valuePositiveInt",
    "valueUnsignedInt",
];

fn is_resource_name(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn write_err(err: impl std::fmt::Display) -> XmlError {
    XmlError::Write(err.to_string())
}

// ---------------------------------------------------------------------------
// JSON -> XML
// ---------------------------------------------------------------------------

/// Serializes a FHIR JSON resource to XML.
pub fn to_xml(value: &Value) -> Result<String, XmlError> {
    let obj = value
        .as_object()
        .ok_or_else(|| XmlError::Structure("resource must be a JSON object".into()))?;
    let resource_type = obj
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| XmlError::Structure("missing resourceType".into()))?;

    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_err)?;
    write_resource(&mut writer, resource_type, obj, true)?;

    String::from_utf8(writer.into_inner()).map_err(write_err)
}

fn write_resource(
    writer: &mut Writer<Vec<u8>>,
    resource_type: &str,
    obj: &Map<String, Value>,
    root: bool,
) -> Result<(), XmlError> {
    let mut start = BytesStart::new(resource_type);
    if root {
        start.push_attribute(("xmlns", FHIR_NAMESPACE));
    }
    writer.write_event(Event::Start(start)).map_err(write_err)?;
    write_members(writer, obj, &[])?;
    writer
        .write_event(Event::End(BytesEnd::new(resource_type)))
        .map_err(write_err)
}

fn write_members(
    writer: &mut Writer<Vec<u8>>,
    obj: &Map<String, Value>,
    attribute_keys: &[&str],
) -> Result<(), XmlError> {
    for (key, value) in obj {
        if key == "resourceType" || attribute_keys.contains(&key.as_str()) {
            continue;
        }

        if let Some(base) = key.strip_prefix('_') {
            // Extension-only primitives have no base value to ride along with.
            if !obj.contains_key(base) {
                write_extension_only(writer, base, value)?;
            }
            continue;
        }

        let companion = obj.get(&format!("_{}", key));
        match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let item_companion = companion
                        .and_then(Value::as_array)
                        .and_then(|c| c.get(i))
                        .filter(|c| !c.is_null());
                    write_value(writer, key, item, item_companion)?;
                }
            }
            _ => write_value(writer, key, value, companion)?,
        }
    }
    Ok(())
}

fn write_extension_only(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    companion: &Value,
) -> Result<(), XmlError> {
    match companion {
        Value::Array(items) => {
            for item in items.iter().filter(|i| !i.is_null()) {
                write_primitive(writer, name, None, Some(item))?;
            }
            Ok(())
        }
        Value::Null => Ok(()),
        other => write_primitive(writer, name, None, Some(other)),
    }
}

fn write_value(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
    companion: Option<&Value>,
) -> Result<(), XmlError> {
    match value {
        Value::Object(map) => match map.get("resourceType").and_then(Value::as_str) {
            Some(resource_type) => {
                writer
                    .write_event(Event::Start(BytesStart::new(name)))
                    .map_err(write_err)?;
                write_resource(writer, resource_type, map, false)?;
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(write_err)
            }
            None => write_complex(writer, name, map),
        },
        Value::String(xhtml) if name == "div" => {
            use std::io::Write;
            writer.get_mut().write_all(xhtml.as_bytes()).map_err(write_err)
        }
        Value::String(s) => write_primitive(writer, name, Some(s.clone()), companion),
        Value::Number(n) => write_primitive(writer, name, Some(n.to_string()), companion),
        Value::Bool(b) => write_primitive(writer, name, Some(b.to_string()), companion),
        Value::Null => match companion {
            Some(_) => write_primitive(writer, name, None, companion),
            None => Ok(()),
        },
        Value::Array(_) => Err(XmlError::Structure(format!(
            "nested array in element '{}'",
            name
        ))),
    }
}

fn write_primitive(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: Option<String>,
    companion: Option<&Value>,
) -> Result<(), XmlError> {
    let mut start = BytesStart::new(name);
    if let Some(id) = companion.and_then(|c| c.get("id")).and_then(Value::as_str) {
        start.push_attribute(("id", id));
    }
    if let Some(value) = &value {
        start.push_attribute(("value", value.as_str()));
    }

    let extensions = companion
        .and_then(|c| c.get("extension"))
        .and_then(Value::as_array)
        .filter(|e| !e.is_empty());

    match extensions {
        None => writer.write_event(Event::Empty(start)).map_err(write_err),
        Some(extensions) => {
            writer.write_event(Event::Start(start)).map_err(write_err)?;
            for extension in extensions {
                write_value(writer, "extension", extension, None)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(write_err)
        }
    }
}

fn write_complex(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    map: &Map<String, Value>,
) -> Result<(), XmlError> {
    let mut start = BytesStart::new(name);
    let mut attribute_keys = Vec::new();

    if let Some(id) = map.get("id").and_then(Value::as_str) {
        start.push_attribute(("id", id));
        attribute_keys.push("id");
    }
    if name == "extension" || name == "modifierExtension" {
        if let Some(url) = map.get("url").and_then(Value::as_str) {
            start.push_attribute(("url", url));
            attribute_keys.push("url");
        }
    }

    let has_children = map
        .keys()
        .any(|k| !attribute_keys.contains(&k.as_str()));
    if !has_children {
        return writer.write_event(Event::Empty(start)).map_err(write_err);
    }

    writer.write_event(Event::Start(start)).map_err(write_err)?;
    write_members(writer, map, &attribute_keys)?;
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(write_err)
}

// ---------------------------------------------------------------------------
// XML -> JSON
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    xhtml: Option<String>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| XmlError::Parse(e.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            if key == "xmlns" || key.starts_with("xmlns:") {
                continue;
            }
            let raw = String::from_utf8_lossy(&attr.value);
            let value = quick_xml::escape::unescape(&raw)
                .map_err(|e| XmlError::Parse(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parses a FHIR XML resource into FHIR JSON.
pub fn from_xml(xml: &str) -> Result<Value, XmlError> {
    let root = parse_tree(xml)?;
    if !is_resource_name(&root.name) {
        return Err(XmlError::Structure(format!(
            "root element '{}' is not a resource",
            root.name
        )));
    }
    Ok(resource_to_json(&root))
}

fn parse_tree(xml: &str) -> Result<Element, XmlError> {
    // No trimming: text outside a narrative div is ignored, text inside it
    // is kept verbatim.
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Parse(e.to_string()))?;
        let finished = match event {
            Event::Start(start) => {
                let element = Element::from_start(&start)?;
                if element.name == "div" && !stack.is_empty() {
                    let xhtml = capture_xhtml(&mut reader, start)?;
                    Some(Element {
                        xhtml: Some(xhtml),
                        ..element
                    })
                } else {
                    stack.push(element);
                    None
                }
            }
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                if element.name == "div" {
                    let mut writer = Writer::new(Vec::new());
                    writer.write_event(Event::Empty(start)).map_err(write_err)?;
                    let xhtml = String::from_utf8(writer.into_inner()).map_err(write_err)?;
                    Some(Element {
                        xhtml: Some(xhtml),
                        ..element
                    })
                } else {
                    Some(element)
                }
            }
            Event::End(_) => Some(
                stack
                    .pop()
                    .ok_or_else(|| XmlError::Parse("unbalanced end tag".into()))?,
            ),
            Event::Eof => break,
            _ => None,
        };

        if let Some(element) = finished {
            match stack.last_mut() {
                Some(parent) => parent.children.push(element),
                None if root.is_none() => root = Some(element),
                None => return Err(XmlError::Structure("multiple root elements".into())),
            }
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Parse("unexpected end of document".into()));
    }
    root.ok_or_else(|| XmlError::Structure("empty document".into()))
}

/// Re-serializes an XHTML subtree, starting at its opening tag.
fn capture_xhtml(reader: &mut Reader<&[u8]>, start: BytesStart<'_>) -> Result<String, XmlError> {
    let mut writer = Writer::new(Vec::new());
    writer.write_event(Event::Start(start)).map_err(write_err)?;

    let mut depth = 1usize;
    loop {
        let event = reader
            .read_event()
            .map_err(|e| XmlError::Parse(e.to_string()))?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth -= 1,
            Event::Eof => return Err(XmlError::Parse("unterminated div element".into())),
            _ => {}
        }
        writer.write_event(event).map_err(write_err)?;
        if depth == 0 {
            break;
        }
    }

    String::from_utf8(writer.into_inner()).map_err(write_err)
}

fn resource_to_json(element: &Element) -> Value {
    let mut map = Map::new();
    map.insert("resourceType".to_string(), Value::String(element.name.clone()));
    members_into(&mut map, &element.name, &element.children);
    Value::Object(map)
}

fn primitive_value(name: &str, raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if NUMERIC_ELEMENTS.contains(&name) {
        if let Ok(number) = raw.parse::<serde_json::Number>() {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}

/// Converts one element into its JSON value and its `_name` companion.
fn element_to_json(element: &Element) -> (Option<Value>, Option<Value>) {
    if let Some(xhtml) = &element.xhtml {
        return (Some(Value::String(xhtml.clone())), None);
    }

    if let Some(child) = contained_resource(element) {
        return (Some(resource_to_json(child)), None);
    }

    if let Some(raw) = element.attribute("value") {
        let value = primitive_value(&element.name, raw);
        let mut companion = Map::new();
        if let Some(id) = element.attribute("id") {
            companion.insert("id".to_string(), Value::String(id.to_string()));
        }
        members_into(&mut companion, &element.name, &element.children);
        let companion = (!companion.is_empty()).then_some(Value::Object(companion));
        return (Some(value), companion);
    }

    let mut map = Map::new();
    for key in ["id", "url"] {
        if let Some(value) = element.attribute(key) {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
    members_into(&mut map, &element.name, &element.children);
    (Some(Value::Object(map)), None)
}

/// Returns the resource wrapped by a container element such as
/// `entry.resource` or `contained`.
fn contained_resource(element: &Element) -> Option<&Element> {
    match element.children.as_slice() {
        [child] if is_resource_name(&child.name) && element.attribute("value").is_none() => {
            Some(child)
        }
        _ => None,
    }
}

fn members_into(map: &mut Map<String, Value>, parent: &str, children: &[Element]) {
    let mut groups: Vec<(&str, Vec<&Element>)> = Vec::new();
    for child in children {
        match groups.iter_mut().find(|(name, _)| *name == child.name) {
            Some((_, members)) => members.push(child),
            None => groups.push((&child.name, vec![child])),
        }
    }

    for (name, members) in groups {
        let converted: Vec<(Option<Value>, Option<Value>)> =
            members.iter().map(|m| element_to_json(m)).collect();

        let repeats = is_array_element(parent, name)
            && !(name == "resource" && contained_resource(members[0]).is_some());
        if members.len() > 1 || repeats {
            let has_values = converted.iter().any(|(v, _)| v.is_some());
            let has_companions = converted.iter().any(|(_, c)| c.is_some());
            let (values, companions): (Vec<Value>, Vec<Value>) = converted
                .into_iter()
                .map(|(v, c)| (v.unwrap_or(Value::Null), c.unwrap_or(Value::Null)))
                .unzip();
            if has_values {
                map.insert(name.to_string(), Value::Array(values));
            }
            if has_companions {
                map.insert(format!("_{}", name), Value::Array(companions));
            }
        } else if let Some((value, companion)) = converted.into_iter().next() {
            if let Some(value) = value {
                map.insert(name.to_string(), value);
            }
            if let Some(companion) = companion {
                map.insert(format!("_{}", name), companion);
            }
        }
    }
}

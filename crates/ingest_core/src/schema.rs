//! Advanced option field descriptors derived from the server's capability schema.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SchemaEntry {
    fn new(name: &str, field_type: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type: field_type.to_string(),
            enum_values: None,
            description: Some(description.to_string()),
            title: None,
        }
    }

    fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|value| value.to_string()).collect());
        self
    }
}

/// Where a schema came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaOrigin {
    Server,
    Fallback,
}

/// Static field list used when the server schema is unavailable.
pub fn fallback_schema() -> Vec<SchemaEntry> {
    vec![
        SchemaEntry::new("api_name", "string", "LLM provider used for analysis"),
        SchemaEntry::new("custom_prompt", "string", "Prompt used for analysis"),
        SchemaEntry::new("system_prompt", "string", "System prompt used for analysis"),
        SchemaEntry::new("summarize_recursively", "boolean", "Summarize chunk summaries again"),
        SchemaEntry::new("chunk_method", "string", "Chunking strategy").with_enum(&[
            "semantic",
            "tokens",
            "paragraphs",
            "sentences",
            "words",
        ]),
        SchemaEntry::new("chunk_size", "integer", "Target chunk size"),
        SchemaEntry::new("chunk_overlap", "integer", "Overlap between chunks"),
        SchemaEntry::new("transcription_model", "string", "Speech-to-text model"),
        SchemaEntry::new("transcription_language", "string", "Spoken language hint"),
        SchemaEntry::new("timestamp_option", "boolean", "Keep timestamps in transcripts"),
        SchemaEntry::new("pdf_parsing_engine", "string", "PDF extraction backend").with_enum(&[
            "pymupdf4llm",
            "pymupdf",
            "docling",
        ]),
        SchemaEntry::new("use_cookies", "boolean", "Send cookies with media downloads"),
        SchemaEntry::new("cookies", "string", "Cookie header for media downloads"),
    ]
}

/// Flatten one component schema of an OpenAPI document into field descriptors.
///
/// `$ref`s are resolved against the document, `allOf` members are merged and
/// nullable `anyOf`/`oneOf` unions collapse to their first non-null variant.
/// A reference already being resolved on the current path is not followed again.
pub fn flatten_schema(document: &Value, schema_name: &str) -> Vec<SchemaEntry> {
    let root = document
        .pointer(&format!("/components/schemas/{schema_name}"))
        .or_else(|| document.get("properties").map(|_| document));
    let Some(root) = root else {
        return Vec::new();
    };

    let mut properties: Vec<(String, &Value)> = Vec::new();
    let mut path = HashSet::new();
    collect_properties(root, document, &mut path, 0, &mut properties);

    properties
        .into_iter()
        .map(|(name, property)| describe(&name, property, document))
        .collect()
}

fn resolve<'a>(
    value: &'a Value,
    document: &'a Value,
    path: &mut HashSet<String>,
) -> Option<(&'a Value, Option<String>)> {
    match value.get("$ref").and_then(Value::as_str) {
        Some(reference) => {
            if path.contains(reference) {
                return None;
            }
            let pointer = reference.strip_prefix('#')?;
            let target = document.pointer(pointer)?;
            Some((target, Some(reference.to_string())))
        }
        None => Some((value, None)),
    }
}

fn collect_properties<'a>(
    schema: &'a Value,
    document: &'a Value,
    path: &mut HashSet<String>,
    depth: usize,
    out: &mut Vec<(String, &'a Value)>,
) {
    if depth > MAX_DEPTH {
        return;
    }
    let Some((schema, reference)) = resolve(schema, document, path) else {
        return;
    };
    if let Some(reference) = &reference {
        path.insert(reference.clone());
    }

    if let Some(members) = schema.get("allOf").and_then(Value::as_array) {
        for member in members {
            collect_properties(member, document, path, depth + 1, out);
        }
    }
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, property) in properties {
            if !out.iter().any(|(existing, _)| existing == name) {
                out.push((name.clone(), property));
            }
        }
    }

    if let Some(reference) = &reference {
        path.remove(reference);
    }
}

fn describe(name: &str, property: &Value, document: &Value) -> SchemaEntry {
    let mut path = HashSet::new();
    let resolved = concrete_variant(property, document, &mut path, 0).unwrap_or(property);
    let description =
        text_field(property, "description").or_else(|| text_field(resolved, "description"));
    let title = text_field(property, "title").or_else(|| text_field(resolved, "title"));
    SchemaEntry {
        name: name.to_string(),
        field_type: type_name(resolved),
        enum_values: enum_values(resolved),
        description,
        title,
    }
}

/// Follow refs and nullable unions down to the schema that carries the type.
fn concrete_variant<'a>(
    value: &'a Value,
    document: &'a Value,
    path: &mut HashSet<String>,
    depth: usize,
) -> Option<&'a Value> {
    if depth > MAX_DEPTH {
        return None;
    }
    let (value, reference) = resolve(value, document, path)?;
    if let Some(reference) = reference {
        path.insert(reference);
        return concrete_variant(value, document, path, depth + 1);
    }
    for key in ["anyOf", "oneOf"] {
        if let Some(variants) = value.get(key).and_then(Value::as_array) {
            let variant = variants
                .iter()
                .find(|variant| variant.get("type").and_then(Value::as_str) != Some("null"))?;
            return concrete_variant(variant, document, path, depth + 1);
        }
    }
    Some(value)
}

fn type_name(schema: &Value) -> String {
    match schema.get("type") {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Array(names)) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null")
            .unwrap_or("string")
            .to_string(),
        _ if schema.get("enum").is_some() => "string".to_string(),
        _ if schema.get("properties").is_some() => "object".to_string(),
        _ => "string".to_string(),
    }
}

fn enum_values(schema: &Value) -> Option<Vec<String>> {
    let values = schema.get("enum")?.as_array()?;
    let values: Vec<String> = values
        .iter()
        .filter(|value| !value.is_null())
        .map(|value| match value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

fn text_field(schema: &Value, key: &str) -> Option<String> {
    schema
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Fields added and removed between two schema versions, by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff_schemas(previous: &[SchemaEntry], next: &[SchemaEntry]) -> SchemaDiff {
    let before: BTreeSet<&str> = previous.iter().map(|entry| entry.name.as_str()).collect();
    let after: BTreeSet<&str> = next.iter().map(|entry| entry.name.as_str()).collect();
    SchemaDiff {
        added: after.difference(&before).map(|name| name.to_string()).collect(),
        removed: before.difference(&after).map(|name| name.to_string()).collect(),
    }
}

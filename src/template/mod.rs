//! # Template/Merge Engine
//!
//! Composes fetched backend values into the single structured output a
//! declaration materializes.
//!
//! Composition runs in three steps:
//! 1. flatten every fetched value into an ordered key/value list
//!    (property extraction, renames, selector prefix handling),
//! 2. merge the list into one mapping under the declared merge policy,
//! 3. render template entries against the flat view and overlay them.
//!
//! Output keys are sorted, so two compositions of unchanged inputs always
//! fingerprint identically.

use crate::crd::{LeafPolicy, MergePolicy, SecretReference, SelectorReference, TemplateSpec};
use crate::provider::FetchResult;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use thiserror::Error;

/// Placeholder syntax for template entries: `{{ source_key }}`
const PLACEHOLDER_PATTERN: &str = r"\{\{\s*([A-Za-z0-9_][A-Za-z0-9_.\-/]*)\s*\}\}";

#[derive(Debug, Error)]
pub enum ComposeError {
    /// Two sources contribute the same output key with differing values
    /// under a policy that forbids it. Values are deliberately not included
    /// in the message - secret material must never reach logs or status.
    #[error("merge conflict on output key '{0}': sources provide differing values")]
    MergeConflict(String),
    /// A template or property reference points at something absent
    #[error("{0}")]
    TemplateError(String),
}

impl ComposeError {
    /// Stable kind string surfaced in status conditions and metrics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ComposeError::MergeConflict(_) => "MergeConflict",
            ComposeError::TemplateError(_) => "TemplateError",
        }
    }
}

/// Which declaration entry produced a fetched value
#[derive(Debug, Clone)]
pub enum SourceOrigin {
    Reference(SecretReference),
    Selector(SelectorReference),
}

/// One fetched value paired with the declaration entry that produced it
#[derive(Debug, Clone)]
pub struct FetchedSource {
    pub origin: SourceOrigin,
    pub result: FetchResult,
}

/// Compose fetched values into the output mapping.
///
/// Sources are processed in declaration order; the merge policy governs key
/// collisions; template entries render against the flat view of all fetched
/// values and override composed keys (the template is the declaration's
/// explicit intent).
///
/// # Errors
///
/// [`ComposeError::MergeConflict`] under `errorOnOverlap` (or a nested leaf
/// conflict with `nestedLeafPolicy: error`); [`ComposeError::TemplateError`]
/// when a template or property references an absent key.
pub fn compose(
    sources: &[FetchedSource],
    template: Option<&TemplateSpec>,
    policy: MergePolicy,
    leaf_policy: LeafPolicy,
) -> Result<BTreeMap<String, Value>, ComposeError> {
    let flat = flatten(sources)?;
    let mut merged = merge(&flat, policy, leaf_policy)?;

    if let Some(template) = template {
        let view = flat_view(&flat);
        let placeholder = Regex::new(PLACEHOLDER_PATTERN)
            .map_err(|e| ComposeError::TemplateError(format!("invalid placeholder pattern: {e}")))?;
        for (output_key, entry) in &template.data {
            let rendered = render_template(output_key, entry, &view, &placeholder)?;
            merged.insert(output_key.clone(), Value::String(rendered));
        }
    }

    Ok(merged)
}

/// Render one value as the string form written into the output Secret
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten fetched sources into an ordered output-key/value list
fn flatten(sources: &[FetchedSource]) -> Result<Vec<(String, Value)>, ComposeError> {
    let mut flat = Vec::with_capacity(sources.len());
    for source in sources {
        match &source.origin {
            SourceOrigin::Reference(reference) => {
                let value = match &reference.property {
                    Some(property) => extract_property(reference, &source.result.value, property)?,
                    None => source.result.value.clone(),
                };
                flat.push((reference_output_key(reference), value));
            }
            SourceOrigin::Selector(selector) => {
                let raw = if selector.strip_prefix {
                    source
                        .result
                        .key
                        .strip_prefix(&selector.prefix)
                        .unwrap_or(source.result.key.as_str())
                } else {
                    source.result.key.as_str()
                };
                flat.push((sanitize_output_key(raw), source.result.value.clone()));
            }
        }
    }
    Ok(flat)
}

/// Output key for an explicit reference: declared rename, else the property
/// name, else the last path segment of the backend key
fn reference_output_key(reference: &SecretReference) -> String {
    if let Some(target) = &reference.target_key {
        return target.clone();
    }
    if let Some(property) = &reference.property {
        return property.clone();
    }
    sanitize_output_key(
        reference
            .key
            .rsplit('/')
            .next()
            .unwrap_or(reference.key.as_str()),
    )
}

/// Secret data keys cannot contain path separators
fn sanitize_output_key(key: &str) -> String {
    key.replace('/', "_")
}

/// Pull a property out of a structured value. String values holding JSON or
/// YAML documents are decomposed first.
fn extract_property(
    reference: &SecretReference,
    value: &Value,
    property: &str,
) -> Result<Value, ComposeError> {
    let object = structured(value).ok_or_else(|| {
        ComposeError::TemplateError(format!(
            "reference '{}' declares property '{property}' but the backend value is not structured",
            reference.key
        ))
    })?;
    object.get(property).cloned().ok_or_else(|| {
        ComposeError::TemplateError(format!(
            "property '{property}' not present in value of '{}'",
            reference.key
        ))
    })
}

/// View a value as a JSON object if it is one, or parses as one.
/// YAML is accepted as a superset of JSON.
fn structured(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_yaml::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

/// Merge the flat list into one mapping under the declared policy
fn merge(
    flat: &[(String, Value)],
    policy: MergePolicy,
    leaf_policy: LeafPolicy,
) -> Result<BTreeMap<String, Value>, ComposeError> {
    let mut merged: BTreeMap<String, Value> = BTreeMap::new();
    for (key, incoming) in flat {
        match merged.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(incoming.clone());
            }
            Entry::Occupied(mut slot) => match policy {
                MergePolicy::Replace => {
                    slot.insert(incoming.clone());
                }
                MergePolicy::ErrorOnOverlap => {
                    // Identical values are not a conflict
                    if slot.get() != incoming {
                        return Err(ComposeError::MergeConflict(key.clone()));
                    }
                }
                MergePolicy::MergeNested => match (slot.get_mut(), incoming) {
                    (Value::Object(dest), Value::Object(src)) => {
                        deep_merge(dest, src, leaf_policy, key)?;
                    }
                    (existing, incoming) => {
                        resolve_leaf(existing, incoming, leaf_policy, key)?;
                    }
                },
            },
        }
    }
    Ok(merged)
}

/// Recursive deep merge of two JSON objects
fn deep_merge(
    dest: &mut Map<String, Value>,
    src: &Map<String, Value>,
    leaf_policy: LeafPolicy,
    path: &str,
) -> Result<(), ComposeError> {
    for (key, incoming) in src {
        let nested_path = format!("{path}.{key}");
        match dest.entry(key.clone()) {
            serde_json::map::Entry::Vacant(slot) => {
                slot.insert(incoming.clone());
            }
            serde_json::map::Entry::Occupied(mut slot) => match (slot.get_mut(), incoming) {
                (Value::Object(nested_dest), Value::Object(nested_src)) => {
                    deep_merge(nested_dest, nested_src, leaf_policy, &nested_path)?;
                }
                (existing, incoming) => {
                    resolve_leaf(existing, incoming, leaf_policy, &nested_path)?;
                }
            },
        }
    }
    Ok(())
}

/// Apply the nested-leaf policy to one colliding leaf
fn resolve_leaf(
    existing: &mut Value,
    incoming: &Value,
    leaf_policy: LeafPolicy,
    path: &str,
) -> Result<(), ComposeError> {
    match leaf_policy {
        LeafPolicy::Replace => {
            *existing = incoming.clone();
            Ok(())
        }
        LeafPolicy::Error => {
            if existing == incoming {
                Ok(())
            } else {
                Err(ComposeError::MergeConflict(path.to_string()))
            }
        }
    }
}

/// Flat key -> string view for template rendering, assembled from all
/// fetched values (later sources shadow earlier ones in the view)
fn flat_view(flat: &[(String, Value)]) -> BTreeMap<String, String> {
    let mut view = BTreeMap::new();
    for (key, value) in flat {
        view.insert(key.clone(), value_to_string(value));
    }
    view
}

/// Substitute `{{ key }}` placeholders in one template entry
fn render_template(
    output_key: &str,
    template: &str,
    view: &BTreeMap<String, String>,
    placeholder: &Regex,
) -> Result<String, ComposeError> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for captures in placeholder.captures_iter(template) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let name = captures.get(1).map_or("", |m| m.as_str());
        let value = view.get(name).ok_or_else(|| {
            ComposeError::TemplateError(format!(
                "template for output key '{output_key}' references unknown source key '{name}'"
            ))
        })?;
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(value);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

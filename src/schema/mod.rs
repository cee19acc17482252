//! Schema contracts for model output
//!
//! Every artifact kind declares its expected shape once, as a static tagged
//! description (field name, type, guidance text). The same description is
//! rendered into a JSON Schema for prompting and drives a single generic
//! validator for the model's response. Guidance strings double as the
//! per-field instructions embedded into prompts for providers that cannot
//! enforce structured output natively.

use serde_json::{json, Map, Value};
use thiserror::Error;

/// Raised when a candidate response does not satisfy its schema contract.
///
/// Recovered locally by the retry loop; never fatal on its own.
#[derive(Debug, Error)]
pub enum SchemaViolation {
    #[error("response is not valid JSON: {0}")]
    NotJson(#[from] serde_json::Error),

    #[error("missing required field '{field}' at {path}")]
    MissingField { path: String, field: String },

    #[error("field '{path}' has wrong type: expected {expected}")]
    WrongType { path: String, expected: String },

    #[error("field '{path}' value '{value}' is not one of the allowed values {allowed:?}")]
    InvalidChoice {
        path: String,
        value: String,
        allowed: &'static [&'static str],
    },
}

/// The kind of value a field must hold
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    /// Free-form string
    Text,
    /// Integer number
    Integer,
    /// Floating-point number (integers accepted)
    Number,
    /// Boolean flag
    Flag,
    /// String restricted to a closed set of values
    Choice(&'static [&'static str]),
    /// List of strings
    TextList,
    /// List of nested objects
    ListOf(&'static ObjectSpec),
}

/// One field of an artifact object
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Natural-language instruction for the model on how to fill this field
    pub guidance: &'static str,
}

/// The declared shape of an object the model must produce
#[derive(Debug)]
pub struct ObjectSpec {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

/// A validated, schema-conformant payload.
///
/// Construction goes through [`SchemaContract::validate`] only, so holding an
/// `Artifact` implies the contract was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    value: Value,
}

impl Artifact {
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Convenience accessor for a top-level field
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.value.get(name)
    }

    /// Renders the payload as pretty JSON, e.g. for verifier prompts
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(&self.value).unwrap_or_else(|_| self.value.to_string())
    }
}

/// A compiled schema contract for one artifact kind
#[derive(Debug, Clone, Copy)]
pub struct SchemaContract {
    root: &'static ObjectSpec,
}

impl SchemaContract {
    pub const fn new(root: &'static ObjectSpec) -> Self {
        Self { root }
    }

    pub fn name(&self) -> &'static str {
        self.root.name
    }

    /// Produces a JSON Schema description of the contract.
    ///
    /// Guidance strings become `description` entries so the same document
    /// serves both as enforcement input for hosted providers and as literal
    /// prompt text for self-hosted ones.
    pub fn describe(&self) -> Value {
        object_schema(self.root)
    }

    /// Validates candidate text against the contract.
    ///
    /// A single leading/trailing fenced code block is stripped before the
    /// parse is attempted; models frequently wrap JSON in markdown fences
    /// despite instructions.
    pub fn validate(&self, candidate: &str) -> Result<Artifact, SchemaViolation> {
        let unwrapped = extract_json_from_markdown(candidate);
        let value: Value = serde_json::from_str(unwrapped)?;
        validate_object(&value, self.root, "$")?;
        Ok(Artifact { value })
    }
}

/// Strips a single markdown code fence (```json or bare ```) wrapping the
/// content. Returns the input trimmed when no fence is found. Idempotent.
pub fn extract_json_from_markdown(content: &str) -> &str {
    let trimmed = content.trim();

    if let Some(rest) = trimmed.strip_prefix("```json") {
        if let Some(end_idx) = rest.find("```") {
            return rest[..end_idx].trim();
        }
    }

    if let Some(rest) = trimmed.strip_prefix("```") {
        if let Some(end_idx) = rest.find("```") {
            return rest[..end_idx].trim();
        }
    }

    trimmed
}

fn object_schema(spec: &ObjectSpec) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for field in spec.fields {
        properties.insert(field.name.to_string(), field_schema(field));
        required.push(Value::String(field.name.to_string()));
    }

    json!({
        "type": "object",
        "title": spec.name,
        "properties": Value::Object(properties),
        "required": Value::Array(required),
    })
}

fn field_schema(field: &FieldSpec) -> Value {
    let mut schema = match field.kind {
        FieldKind::Text => json!({"type": "string"}),
        FieldKind::Integer => json!({"type": "integer"}),
        FieldKind::Number => json!({"type": "number"}),
        FieldKind::Flag => json!({"type": "boolean"}),
        FieldKind::Choice(allowed) => json!({"type": "string", "enum": allowed}),
        FieldKind::TextList => json!({"type": "array", "items": {"type": "string"}}),
        FieldKind::ListOf(spec) => json!({"type": "array", "items": object_schema(spec)}),
    };

    if !field.guidance.is_empty() {
        schema["description"] = Value::String(field.guidance.to_string());
    }

    schema
}

fn validate_object(value: &Value, spec: &ObjectSpec, path: &str) -> Result<(), SchemaViolation> {
    let obj = value.as_object().ok_or_else(|| SchemaViolation::WrongType {
        path: path.to_string(),
        expected: format!("object ({})", spec.name),
    })?;

    for field in spec.fields {
        let field_path = format!("{}.{}", path, field.name);
        let entry = obj
            .get(field.name)
            .ok_or_else(|| SchemaViolation::MissingField {
                path: path.to_string(),
                field: field.name.to_string(),
            })?;
        validate_field(entry, field, &field_path)?;
    }

    Ok(())
}

fn validate_field(value: &Value, field: &FieldSpec, path: &str) -> Result<(), SchemaViolation> {
    let wrong_type = |expected: &str| SchemaViolation::WrongType {
        path: path.to_string(),
        expected: expected.to_string(),
    };

    match field.kind {
        FieldKind::Text => {
            value.as_str().ok_or_else(|| wrong_type("string"))?;
        }
        FieldKind::Integer => {
            value.as_i64().ok_or_else(|| wrong_type("integer"))?;
        }
        FieldKind::Number => {
            value.as_f64().ok_or_else(|| wrong_type("number"))?;
        }
        FieldKind::Flag => {
            value.as_bool().ok_or_else(|| wrong_type("boolean"))?;
        }
        FieldKind::Choice(allowed) => {
            let s = value.as_str().ok_or_else(|| wrong_type("string"))?;
            if !allowed.contains(&s) {
                return Err(SchemaViolation::InvalidChoice {
                    path: path.to_string(),
                    value: s.to_string(),
                    allowed,
                });
            }
        }
        FieldKind::TextList => {
            let items = value.as_array().ok_or_else(|| wrong_type("array of strings"))?;
            for (idx, item) in items.iter().enumerate() {
                if !item.is_string() {
                    return Err(SchemaViolation::WrongType {
                        path: format!("{}[{}]", path, idx),
                        expected: "string".to_string(),
                    });
                }
            }
        }
        FieldKind::ListOf(spec) => {
            let items = value.as_array().ok_or_else(|| wrong_type("array of objects"))?;
            for (idx, item) in items.iter().enumerate() {
                validate_object(item, spec, &format!("{}[{}]", path, idx))?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    static INNER: ObjectSpec = ObjectSpec {
        name: "inner",
        fields: &[
            FieldSpec {
                name: "step",
                kind: FieldKind::Integer,
                guidance: "Step number",
            },
            FieldSpec {
                name: "label",
                kind: FieldKind::Text,
                guidance: "",
            },
        ],
    };

    static ROOT: ObjectSpec = ObjectSpec {
        name: "sample",
        fields: &[
            FieldSpec {
                name: "id",
                kind: FieldKind::Text,
                guidance: "Unique identifier",
            },
            FieldSpec {
                name: "score",
                kind: FieldKind::Number,
                guidance: "",
            },
            FieldSpec {
                name: "level",
                kind: FieldKind::Choice(&["HIGH", "MEDIUM", "LOW"]),
                guidance: "Criticality level",
            },
            FieldSpec {
                name: "items",
                kind: FieldKind::ListOf(&INNER),
                guidance: "Nested rows",
            },
        ],
    };

    const CONTRACT: SchemaContract = SchemaContract::new(&ROOT);

    fn conformant() -> String {
        json!({
            "id": "TC-001",
            "score": 87.5,
            "level": "HIGH",
            "items": [{"step": 1, "label": "deposit"}, {"step": 2, "label": "allocate"}]
        })
        .to_string()
    }

    #[test]
    fn test_validate_conformant_payload_round_trips() {
        let artifact = CONTRACT.validate(&conformant()).unwrap();
        let expected: Value = serde_json::from_str(&conformant()).unwrap();
        assert_eq!(artifact.value(), &expected);

        // render → validate returns the same payload
        let again = CONTRACT.validate(&artifact.render()).unwrap();
        assert_eq!(again, artifact);
    }

    #[test]
    fn test_validate_rejects_non_json() {
        let err = CONTRACT.validate("this is not json").unwrap_err();
        assert!(matches!(err, SchemaViolation::NotJson(_)));
    }

    #[test]
    fn test_validate_rejects_missing_field() {
        let candidate = json!({"id": "TC-001", "score": 1.0, "level": "HIGH"}).to_string();
        let err = CONTRACT.validate(&candidate).unwrap_err();
        match err {
            SchemaViolation::MissingField { field, .. } => assert_eq!(field, "items"),
            other => panic!("unexpected violation: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let candidate = json!({
            "id": "TC-001",
            "score": "not a number",
            "level": "HIGH",
            "items": []
        })
        .to_string();
        let err = CONTRACT.validate(&candidate).unwrap_err();
        assert!(matches!(err, SchemaViolation::WrongType { .. }));
    }

    #[test]
    fn test_validate_rejects_choice_outside_allowed_set() {
        let candidate = json!({
            "id": "TC-001",
            "score": 1.0,
            "level": "CRITICAL",
            "items": []
        })
        .to_string();
        let err = CONTRACT.validate(&candidate).unwrap_err();
        match err {
            SchemaViolation::InvalidChoice { value, .. } => assert_eq!(value, "CRITICAL"),
            other => panic!("unexpected violation: {other}"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_nested_object() {
        let candidate = json!({
            "id": "TC-001",
            "score": 1.0,
            "level": "LOW",
            "items": [{"step": "one", "label": "deposit"}]
        })
        .to_string();
        assert!(CONTRACT.validate(&candidate).is_err());
    }

    #[test]
    fn test_extra_fields_are_tolerated() {
        let candidate = json!({
            "id": "TC-001",
            "score": 1.0,
            "level": "LOW",
            "items": [],
            "commentary": "models add these"
        })
        .to_string();
        assert!(CONTRACT.validate(&candidate).is_ok());
    }

    #[test]
    fn test_fenced_json_parses_same_as_bare() {
        let bare = conformant();
        let fenced = format!("```json\n{}\n```", bare);
        let untagged = format!("```\n{}\n```", bare);

        let a = CONTRACT.validate(&bare).unwrap();
        let b = CONTRACT.validate(&fenced).unwrap();
        let c = CONTRACT.validate(&untagged).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_fence_unwrap_is_idempotent() {
        let fenced = format!("```json\n{}\n```", conformant());
        let once = extract_json_from_markdown(&fenced);
        let twice = extract_json_from_markdown(once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fence_unwrap_plain_text_is_trimmed_passthrough() {
        assert_eq!(extract_json_from_markdown("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_describe_embeds_guidance_and_requires_all_fields() {
        let schema = CONTRACT.describe();
        assert_eq!(schema["type"], json!("object"));
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 4);
        assert_eq!(
            schema["properties"]["id"]["description"],
            json!("Unique identifier")
        );
        assert_eq!(
            schema["properties"]["level"]["enum"],
            json!(["HIGH", "MEDIUM", "LOW"])
        );
        assert_eq!(
            schema["properties"]["items"]["items"]["properties"]["step"]["type"],
            json!("integer")
        );
    }
}

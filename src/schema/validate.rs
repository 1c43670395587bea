use serde_json::Value;

use super::ast::{Literal, Node};

#[derive(Debug, Eq, PartialEq)]
pub struct ValidationError(String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValidationError {}

/// Compiled schema, ready to validate decoded JSON objects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Schema {
    body: Vec<Node>,
}

impl Schema {
    pub fn compile(source: &str) -> Result<Self, crate::error::Error> {
        let node = super::parser::parse(source)?;
        let Node::Schema(body) = node else {
            return Err(crate::error::Error::protocol("schema root must be a bracketed list"));
        };
        Ok(Self { body })
    }

    /// Validates a decoded JSON object against the compiled schema. Unknown
    /// extra fields in `data` are silently ignored. Field lookup is
    /// case-insensitive.
    pub fn validate(&self, data: &serde_json::Map<String, Value>) -> Result<(), ValidationError> {
        validate_body(&self.body, data)
    }
}

fn validate_body(body: &[Node], data: &serde_json::Map<String, Value>) -> Result<(), ValidationError> {
    for assign in body {
        let Node::Assign { name, value } = assign else {
            unreachable!("schema body only ever contains Assign nodes");
        };

        let found = data
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, v)| v);

        let Some(field_value) = found else {
            return Err(ValidationError(format!("missing field '{name}'")));
        };

        validate_node(value, field_value).map_err(|e| ValidationError(format!("field '{name}': {e}")))?;
    }
    Ok(())
}

fn validate_node(node: &Node, value: &Value) -> Result<(), ValidationError> {
    match node {
        Node::Literal(Literal::Int) => {
            if value.as_i64().is_none() && value.as_u64().is_none() {
                return Err(ValidationError(format!("expected number, got {value}")));
            }
            Ok(())
        }
        Node::Literal(Literal::Str) => {
            if !value.is_string() {
                return Err(ValidationError(format!("expected string, got {value}")));
            }
            Ok(())
        }
        Node::Schema(nested) => {
            let Some(object) = value.as_object() else {
                return Err(ValidationError(format!("expected object, got {value}")));
            };
            validate_body(nested, object)
        }
        Node::Assign { .. } => unreachable!("assignment is never a validation target"),
    }
}

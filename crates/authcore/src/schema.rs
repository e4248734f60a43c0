//! A small JSON-schema subset for describing flow inputs.
//!
//! Schemas are built in code by each input declaration, serialized verbatim
//! into the output view so clients know what to submit, and compiled with
//! `jsonschema` (draft 2020-12) for the matcher to decide structurally
//! whether a raw input fits.

use crate::JsonPointer;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Null,
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchemaType::Object => "object",
            SchemaType::String => "string",
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Array => "array",
            SchemaType::Null => "null",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<SchemaType>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties", skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
    #[serde(rename = "const", skip_serializing_if = "Option::is_none")]
    pub const_value: Option<Json>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Json>>,
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
}

/// A single reason a value failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub pointer: JsonPointer,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.pointer, self.message)
    }
}

impl Schema {
    pub fn of_type(ty: SchemaType) -> Self {
        Self {
            ty: Some(ty),
            ..Self::default()
        }
    }

    pub fn object() -> Self {
        Self::of_type(SchemaType::Object)
    }

    pub fn string() -> Self {
        Self::of_type(SchemaType::String)
    }

    pub fn integer() -> Self {
        Self::of_type(SchemaType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of_type(SchemaType::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of_type(SchemaType::Array)
        }
    }

    /// Schema matching exactly one value.
    pub fn constant(value: impl Into<Json>) -> Self {
        Self {
            const_value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn one_of_values<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Json>,
    {
        Self {
            enum_values: Some(values.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    pub fn required<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn additional_properties(mut self, allowed: bool) -> Self {
        self.additional_properties = Some(allowed);
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }

    pub fn compile(&self) -> Result<CompiledSchema, Violation> {
        let json = self.to_json();
        jsonschema::draft202012::options()
            .build(&json)
            .map(|validator| CompiledSchema { validator })
            .map_err(|e| Violation {
                pointer: JsonPointer::root(),
                message: format!("schema does not compile: {}", e),
            })
    }

    /// Compiles and checks in one go. Callers matching repeatedly should
    /// hold on to a [`CompiledSchema`].
    pub fn is_valid(&self, value: &Json) -> bool {
        self.compile().map(|c| c.is_valid(value)).unwrap_or(false)
    }

    pub fn validate(&self, value: &Json) -> Result<(), Vec<Violation>> {
        self.compile().map_err(|e| vec![e])?.validate(value)
    }
}

/// A [`Schema`] ready to validate values.
pub struct CompiledSchema {
    validator: jsonschema::Validator,
}

impl CompiledSchema {
    pub fn is_valid(&self, value: &Json) -> bool {
        self.validator.is_valid(value)
    }

    /// Every violation, each located by the pointer of the offending value.
    pub fn validate(&self, value: &Json) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> = self
            .validator
            .iter_errors(value)
            .map(|err| Violation {
                pointer: err.instance_path.to_string().parse().unwrap_or_default(),
                message: err.to_string(),
            })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn select(method: &str) -> Schema {
        Schema::object()
            .property("authentication", Schema::constant(method))
            .required(["authentication"])
    }

    #[test]
    fn const_property_discriminates_shapes() {
        let password = select("password");
        assert!(password.is_valid(&json!({"authentication": "password"})));
        assert!(!password.is_valid(&json!({"authentication": "email_login_link"})));
        assert!(!password.is_valid(&json!({})));
        assert!(!password.is_valid(&json!("password")));
    }

    #[test]
    fn reports_every_violation_with_location() {
        let schema = Schema::object()
            .property("login_id", Schema::string().min_length(1))
            .property("code", Schema::string().max_length(6))
            .required(["login_id", "code"])
            .additional_properties(false);

        let errs = schema
            .validate(&json!({"login_id": "", "extra": true}))
            .unwrap_err();
        assert_eq!(errs.len(), 3);
        let at = |pointer: &str| {
            errs.iter()
                .filter(|v| v.pointer.to_string() == pointer)
                .map(|v| v.message.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(at("/login_id").len(), 1);
        let root = at("");
        assert_eq!(root.len(), 2);
        assert!(root.iter().any(|m| m.contains("code")));
        assert!(root.iter().any(|m| m.contains("extra")));
    }

    #[test]
    fn validates_array_items_and_enums() {
        let schema = Schema::array(Schema::one_of_values(["a", "b"]));
        assert!(schema.is_valid(&json!(["a", "b", "a"])));
        let errs = schema.validate(&json!(["a", "c"])).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].pointer.to_string(), "/1");
    }

    #[test]
    fn compiled_schema_is_reusable() {
        let compiled = select("password").compile().unwrap();
        assert!(compiled.is_valid(&json!({"authentication": "password"})));
        assert!(!compiled.is_valid(&json!({"authentication": 1})));
        let errs = compiled.validate(&json!({"authentication": 1})).unwrap_err();
        assert_eq!(errs[0].pointer.to_string(), "/authentication");
        assert!(errs[0].to_string().starts_with("/authentication: "));
    }

    #[test]
    fn integers_and_lengths_follow_draft_2020_12() {
        let schema = Schema::object()
            .property("n", Schema::integer())
            .property("code", Schema::string().min_length(2).max_length(2));
        assert!(schema.is_valid(&json!({"n": 3, "code": "ab"})));
        assert!(!schema.is_valid(&json!({"n": 3.5})));
        assert!(!schema.is_valid(&json!({"code": "abc"})));
        assert!(schema.is_valid(&json!({"code": "éé"})));
    }

    #[test]
    fn serializes_as_json_schema() {
        let schema = select("password").additional_properties(false);
        assert_eq!(
            schema.to_json(),
            json!({
                "type": "object",
                "properties": {"authentication": {"const": "password"}},
                "required": ["authentication"],
                "additionalProperties": false
            })
        );
    }
}

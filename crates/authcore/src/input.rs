use crate::{CompiledSchema, FlowError, InputError, JsonPointer, Schema, Violation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A validated, decoded input handed to a reactor.
///
/// Reactors find out what they were given by downcasting to the concrete
/// input types they understand.
pub trait Input: AsAny + Debug + Send + Sync {}

impl<'a> dyn Input + 'a {
    pub fn downcast_ref<T: Input + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Input + 'static>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Declares one acceptable input shape at the current step.
pub trait InputSchema: Send + Sync {
    /// Stable, client-visible name such as `SelectPassword`.
    fn name(&self) -> &str;

    fn schema(&self) -> Schema;

    /// Whether `raw` fits structurally.
    fn matches(&self, raw: &serde_json::Value) -> bool {
        self.schema().is_valid(raw)
    }

    /// Validates `raw` against [`InputSchema::schema`] and decodes it.
    fn make_input(&self, raw: &serde_json::Value) -> Result<Box<dyn Input>, InputError>;
}

/// The usual input schema: validate structurally, then deserialize into `T`.
pub struct TypedSchema<T> {
    name: &'static str,
    schema: Schema,
    compiled: Result<CompiledSchema, Violation>,
    _input: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T>
where
    T: Input + DeserializeOwned + 'static,
{
    pub fn new(name: &'static str, schema: Schema) -> Self {
        let compiled = schema.compile();
        if let Err(e) = &compiled {
            tracing::error!(schema = name, "Input schema rejected: {}", e);
        }
        Self {
            name,
            schema,
            compiled,
            _input: PhantomData,
        }
    }

    pub fn boxed(name: &'static str, schema: Schema) -> Box<dyn InputSchema> {
        Box::new(Self::new(name, schema))
    }
}

impl<T> InputSchema for TypedSchema<T>
where
    T: Input + DeserializeOwned + 'static,
{
    fn name(&self) -> &str {
        self.name
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    fn matches(&self, raw: &serde_json::Value) -> bool {
        self.compiled.as_ref().map_or(false, |c| c.is_valid(raw))
    }

    fn make_input(&self, raw: &serde_json::Value) -> Result<Box<dyn Input>, InputError> {
        self.compiled
            .as_ref()
            .map_err(|e| vec![e.clone()])
            .and_then(|c| c.validate(raw))
            .map_err(|violations| InputError::SchemaViolation {
                schema: self.name.to_string(),
                violations,
            })?;
        let input: T = serde_json::from_value(raw.clone()).map_err(|e| InputError::Decode {
            schema: self.name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Box::new(input))
    }
}

/// Input as it arrives from the request layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInput {
    /// Which open step the input targets. Optional while only one step is
    /// accepting input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<JsonPointer>,
    #[serde(default)]
    pub input: serde_json::Value,
}

impl RawInput {
    pub fn new(input: serde_json::Value) -> Self {
        Self {
            pointer: None,
            input,
        }
    }

    pub fn at(mut self, pointer: JsonPointer) -> Self {
        self.pointer = Some(pointer);
        self
    }
}

/// Client-facing description of one legal next input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub name: String,
    pub pointer: JsonPointer,
    pub schema: serde_json::Value,
}

/// A schema offered by the reactor at `pointer`.
pub struct OfferedSchema {
    pub pointer: JsonPointer,
    pub schema: Box<dyn InputSchema>,
}

impl OfferedSchema {
    pub fn describe(&self) -> InputDescriptor {
        InputDescriptor {
            name: self.schema.name().to_string(),
            pointer: self.pointer.clone(),
            schema: self.schema.schema().to_json(),
        }
    }
}

/// Resolves `raw` against `offered`: schemas addressed by a different pointer
/// are skipped, then the first structural match wins.
pub fn match_input(
    offered: &[OfferedSchema],
    raw: &RawInput,
) -> Result<(usize, Box<dyn Input>), FlowError> {
    for (index, candidate) in offered.iter().enumerate() {
        if let Some(pointer) = &raw.pointer {
            if pointer != &candidate.pointer {
                continue;
            }
        }
        if !candidate.schema.matches(&raw.input) {
            tracing::debug!(schema = candidate.schema.name(), "input rejected by schema");
            continue;
        }
        let input = candidate.schema.make_input(&raw.input)?;
        return Ok((index, input));
    }

    Err(FlowError::IncompatibleInput {
        tried: offered.iter().map(OfferedSchema::describe).collect(),
    })
}

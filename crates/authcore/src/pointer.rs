use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// RFC 6901 JSON pointer.
///
/// Used in two places: addressing a position inside a flow graph (every token
/// is a node index, `""` is the root graph) and addressing a value inside a
/// JSON document (schema violations, claim lookups).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JsonPointer {
    tokens: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid JSON pointer '{0}': must be empty or start with '/'")]
pub struct PointerParseError(pub String);

impl JsonPointer {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn is_root(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Returns a new pointer with `token` appended.
    pub fn child(&self, token: impl ToString) -> Self {
        let mut tokens = self.tokens.clone();
        tokens.push(token.to_string());
        Self { tokens }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.tokens.is_empty() {
            return None;
        }
        let mut tokens = self.tokens.clone();
        tokens.pop();
        Some(Self { tokens })
    }

    pub fn last(&self) -> Option<&str> {
        self.tokens.last().map(String::as_str)
    }

    /// Interprets every token as an array index. `None` if any token is not
    /// a non-negative integer.
    pub fn indices(&self) -> Option<Vec<usize>> {
        self.tokens.iter().map(|t| t.parse::<usize>().ok()).collect()
    }

    pub fn traverse<'v>(&self, value: &'v serde_json::Value) -> Option<&'v serde_json::Value> {
        if self.tokens.is_empty() {
            return Some(value);
        }
        value.pointer(&self.to_string())
    }
}

impl fmt::Display for JsonPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for token in &self.tokens {
            write!(f, "/{}", token.replace('~', "~0").replace('/', "~1"))?;
        }
        Ok(())
    }
}

impl FromStr for JsonPointer {
    type Err = PointerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| PointerParseError(s.to_string()))?;
        let tokens = rest
            .split('/')
            .map(|t| t.replace("~1", "/").replace("~0", "~"))
            .collect();
        Ok(Self { tokens })
    }
}

impl Serialize for JsonPointer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JsonPointer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

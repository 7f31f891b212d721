//! Engine-neutral JavaScript values and completions.
//!
//! Engines hand values to the harness in this form: primitives by value,
//! objects and symbols by an engine-assigned identity handle. Nothing here
//! can run user code, so comparing or printing a value never has side
//! effects in the engine under test.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of an object inside one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub handle: u32,
    /// `[[Class]]`-style tag, display only.
    pub class: String,
}

/// Identity of a symbol inside one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRef {
    pub handle: u32,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(#[serde(with = "js_number")] f64),
    /// Canonical decimal digits, optional leading `-`.
    #[serde(rename = "bigint")]
    BigInt(String),
    String(String),
    Symbol(SymbolRef),
    Object(ObjectRef),
}

impl JsValue {
    pub fn number(value: f64) -> Self {
        Self::Number(value)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn object(handle: u32, class: impl Into<String>) -> Self {
        Self::Object(ObjectRef {
            handle,
            class: class.into(),
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::BigInt(_) => "bigint",
            Self::String(_) => "string",
            Self::Symbol(_) => "symbol",
            Self::Object(_) => "object",
        }
    }

    /// SameValue (ECMA-262 §7.2.10): NaN equals NaN, +0 and -0 differ.
    pub fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(lhs), Self::Number(rhs)) => {
                if lhs.is_nan() && rhs.is_nan() {
                    return true;
                }
                lhs == rhs && lhs.is_sign_negative() == rhs.is_sign_negative()
            }
            _ => self.same_non_number(other),
        }
    }

    /// IsStrictlyEqual (`===`): NaN never equals itself, +0 equals -0.
    pub fn strict_equals(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(lhs), Self::Number(rhs)) => lhs == rhs,
            _ => self.same_non_number(other),
        }
    }

    fn same_non_number(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(lhs), Self::Bool(rhs)) => lhs == rhs,
            (Self::BigInt(lhs), Self::BigInt(rhs)) => lhs == rhs,
            (Self::String(lhs), Self::String(rhs)) => lhs == rhs,
            (Self::Symbol(lhs), Self::Symbol(rhs)) => lhs.handle == rhs.handle,
            (Self::Object(lhs), Self::Object(rhs)) => lhs.handle == rhs.handle,
            _ => false,
        }
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{}", js_number::to_js_string(*n)),
            Self::BigInt(digits) => write!(f, "{digits}n"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Symbol(symbol) => match &symbol.description {
                Some(description) => write!(f, "Symbol({description})"),
                None => write!(f, "Symbol()"),
            },
            Self::Object(object) => write!(f, "[object {}#{}]", object.class, object.handle),
        }
    }
}

/// Result of evaluating a script or calling a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Completion {
    Normal(JsValue),
    Thrown(JsValue),
}

impl Completion {
    pub fn is_thrown(&self) -> bool {
        matches!(self, Self::Thrown(_))
    }

    pub fn value(&self) -> &JsValue {
        match self {
            Self::Normal(value) | Self::Thrown(value) => value,
        }
    }
}

/// Numbers travel as strings so NaN, the infinities and -0 survive JSON.
pub(crate) mod js_number {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn to_js_string(value: f64) -> String {
        if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            if value > 0.0 {
                "Infinity".to_string()
            } else {
                "-Infinity".to_string()
            }
        } else if value == 0.0 {
            if value.is_sign_negative() {
                "-0".to_string()
            } else {
                "0".to_string()
            }
        } else {
            format!("{value}")
        }
    }

    pub fn parse_js_string(raw: &str) -> Option<f64> {
        match raw.trim() {
            "NaN" => Some(f64::NAN),
            "Infinity" | "+Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            "-0" => Some(-0.0),
            other => other.parse::<f64>().ok().filter(|value| value.is_finite()),
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&to_js_string(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_js_string(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid number encoding `{raw}`")))
    }
}

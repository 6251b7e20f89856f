//! Local methods the bridge can call on this peer.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rpc_bridge::{RpcReply, RpcRequest, REGISTERED_METHODS_ACTION};
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Reply status for a successful call
pub const STATUS_OK: i32 = 200;
/// Reply status when the action is not registered
pub const STATUS_NOT_FOUND: i32 = 404;
/// Reply status when the method fails
pub const STATUS_ERROR: i32 = 500;

/// Failure inside a method body
#[derive(Debug, thiserror::Error)]
pub enum MethodError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

type Method = Box<dyn Fn(&[Value]) -> Result<Value, MethodError> + Send + Sync>;

/// Named methods answering bridge requests.
#[derive(Default)]
pub struct MethodRegistry {
    methods: BTreeMap<String, Method>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `base64`, `echo`, and `addSafe`
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("base64", base64_encode);
        registry.register("echo", |args| Ok(args.first().cloned().unwrap_or(Value::Null)));
        registry.register("addSafe", add_safe);
        registry
    }

    pub fn register<F>(&mut self, name: &str, method: F)
    where
        F: Fn(&[Value]) -> Result<Value, MethodError> + Send + Sync + 'static,
    {
        debug!(method = name, "Registered method");
        self.methods.insert(name.to_string(), Box::new(method));
    }

    /// Registered names, excluding the built-in listing action
    pub fn names(&self) -> Vec<&str> {
        self.methods
            .keys()
            .map(String::as_str)
            .filter(|name| *name != REGISTERED_METHODS_ACTION)
            .collect()
    }

    /// Run `request` and build the reply to send back.
    pub fn dispatch(&self, request: &RpcRequest) -> RpcReply {
        let (status, result) = if request.action == REGISTERED_METHODS_ACTION {
            (STATUS_OK, Value::String(self.names().join(",")))
        } else {
            match self.methods.get(&request.action) {
                None => (
                    STATUS_NOT_FOUND,
                    Value::String(format!("method {} is not registered", request.action)),
                ),
                Some(method) => match method(&request.params) {
                    Ok(result) => (STATUS_OK, result),
                    Err(e) => {
                        warn!(action = %request.action, error = %e, "Method failed");
                        (STATUS_ERROR, Value::String(format!("execution error: {e}")))
                    }
                },
            }
        };

        RpcReply {
            callback_id: request.id.clone(),
            status,
            result,
        }
    }
}

/// String form of an argument as a script would coerce it
fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Base64 of the first argument's Latin-1 bytes
fn base64_encode(args: &[Value]) -> Result<Value, MethodError> {
    let input = args.first().map(coerce_string).unwrap_or_default();
    let bytes = input
        .chars()
        .map(|c| {
            u8::try_from(u32::from(c)).map_err(|_| {
                MethodError::InvalidArgument(format!("character {c:?} is outside Latin-1"))
            })
        })
        .collect::<Result<Vec<u8>, _>>()?;
    Ok(Value::String(STANDARD.encode(bytes)))
}

fn to_number(value: Option<&Value>) -> Result<f64, MethodError> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => Some(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::Null) => Some(0.0),
        _ => None,
    };
    parsed
        .filter(|n| !n.is_nan())
        .ok_or_else(|| MethodError::InvalidArgument("arguments must be valid numbers".into()))
}

/// Sum of two numeric (or numeric-string) arguments
fn add_safe(args: &[Value]) -> Result<Value, MethodError> {
    let sum = to_number(args.first())? + to_number(args.get(1))?;

    if sum.fract() == 0.0 && sum.abs() < i64::MAX as f64 {
        return Ok(Value::from(sum as i64));
    }
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| MethodError::InvalidArgument("sum is not a finite number".into()))
}

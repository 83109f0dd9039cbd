//! Binding errors and async error descriptors

use tether_engine::{Context, ErrorKind, PropertyFlags, Value};
use tether_value::ValueTree;

use crate::convert::value_tree_to_js;

/// Binding layer errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error(transparent)]
    Engine(#[from] tether_engine::Error),
    /// A bound slot no longer names a template property
    #[error("cannot get property {0}")]
    TemplateCorrupted(String),
    #[error("this object js call is disabled")]
    CallDisabled,
    #[error("object creator returned no native object")]
    CreatorReturnedNone,
    /// Attach is one-shot: the object is attached or was detached already
    #[error("native object cannot be attached again")]
    NotAttachable,
    #[error("value is not backed by a native object")]
    NotNativeObject,
}

/// Binding result
pub type Result<T> = std::result::Result<T, BindError>;

impl BindError {
    /// Turn into a pending script exception
    pub fn throw(self, ctx: &Context) -> tether_engine::Error {
        match self {
            BindError::Engine(e) => e,
            other => ctx.throw_error(ErrorKind::Internal, &other.to_string()),
        }
    }
}

/// Error delivered to an async callback: name, message and code, or a
/// custom payload that replaces the error object entirely
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorDesc {
    pub name: String,
    pub message: String,
    pub code: i32,
    pub custom: Option<ValueTree>,
}

impl ErrorDesc {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), ..Self::default() }
    }

    pub fn custom(payload: ValueTree) -> Self {
        Self { custom: Some(payload), ..Self::default() }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Describe a thrown script value
    pub fn from_exception(ctx: &Context, exception: &Value) -> Self {
        if !ctx.is_error(exception) {
            return Self::new(ctx.to_display_string(exception));
        }
        let text = |key: &str| {
            ctx.get_property(exception, key)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default()
        };
        Self { name: text("name"), message: text("message"), code: 0, custom: None }
    }

    /// Build the script value handed to callbacks
    pub fn to_value(&self, ctx: &Context) -> Value {
        if let Some(custom) = &self.custom {
            return value_tree_to_js(ctx, custom);
        }
        let error = ctx.new_error(ErrorKind::Error, &self.message);
        let flags = PropertyFlags::WRITABLE | PropertyFlags::CONFIGURABLE;
        if !self.name.is_empty() {
            let _ = ctx.define_property_value(&error, "name", self.name.as_str().into(), flags);
        }
        let _ = ctx.define_property_value(&error, "code", Value::Int(self.code), PropertyFlags::ALL);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_desc_to_value() {
        let ctx = Context::new();
        let err = ErrorDesc::new("boom").with_name("IoError").with_code(5).to_value(&ctx);
        assert_eq!(ctx.get_property(&err, "message").unwrap(), Value::from("boom"));
        assert_eq!(ctx.get_property(&err, "name").unwrap(), Value::from("IoError"));
        assert_eq!(ctx.get_property(&err, "code").unwrap(), Value::Int(5));
    }

    #[test]
    fn test_custom_payload_replaces_error() {
        let ctx = Context::new();
        let payload: ValueTree = [("reason", ValueTree::from("denied"))].into_iter().collect();
        let err = ErrorDesc::custom(payload).to_value(&ctx);
        assert!(!ctx.is_error(&err));
        assert_eq!(ctx.get_property(&err, "reason").unwrap(), Value::from("denied"));
    }

    #[test]
    fn test_bind_error_throws_internal_error() {
        let ctx = Context::new();
        let err = BindError::CallDisabled.throw(&ctx);
        assert_eq!(err, tether_engine::Error::Exception);
        let exc = ctx.catch();
        assert_eq!(
            ctx.describe_exception(&exc),
            "InternalError: this object js call is disabled"
        );
    }
}

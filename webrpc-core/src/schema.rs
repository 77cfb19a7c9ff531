//! Schema-driven method dispatch, with no separate interface-description
//! language. A [`ServiceSchema`]
//! is just a map from method name to its kind; request/response shapes are
//! carried by the strongly-typed handlers the server/client crates register,
//! not by anything in this schema itself.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Unary,
    ServerStream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidMethodName(pub String);

impl fmt::Display for InvalidMethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid method name {:?}: must match ^[a-z][A-Za-z0-9]*$",
            self.0
        )
    }
}

impl std::error::Error for InvalidMethodName {}

/// Validate a method name against `^[a-z][A-Za-z0-9]*$`.
pub fn validate_method_name(name: &str) -> Result<(), InvalidMethodName> {
    let mut chars = name.chars();
    let ok = match chars.next() {
        Some(c) if c.is_ascii_lowercase() => chars.all(|c| c.is_ascii_alphanumeric()),
        _ => false,
    };
    if ok { Ok(()) } else { Err(InvalidMethodName(name.to_string())) }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceSchema {
    methods: BTreeMap<String, MethodKind>,
}

impl ServiceSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a method. Panics on an invalid method name or duplicate
    /// registration — fail fast at startup rather than lazily per-call.
    pub fn register(mut self, name: impl Into<String>, kind: MethodKind) -> Self {
        let name = name.into();
        validate_method_name(&name).expect("method name must be lower-camel-case");
        if self.methods.contains_key(&name) {
            panic!("method {name:?} already registered");
        }
        self.methods.insert(name, kind);
        self
    }

    pub fn kind_of(&self, name: &str) -> Option<MethodKind> {
        self.methods.get(name).copied()
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, MethodKind)> {
        self.methods.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lower_camel_case() {
        assert!(validate_method_name("getHello").is_ok());
        assert!(validate_method_name("increment").is_ok());
    }

    #[test]
    fn rejects_leading_uppercase_or_digit() {
        assert!(validate_method_name("GetHello").is_err());
        assert!(validate_method_name("1hello").is_err());
        assert!(validate_method_name("").is_err());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn register_panics_on_duplicate() {
        ServiceSchema::new()
            .register("increment", MethodKind::Unary)
            .register("increment", MethodKind::Unary);
    }
}

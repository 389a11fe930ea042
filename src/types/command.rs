//! Command definitions

use serde::Serialize;

use crate::{Result, TelloError};

/// Reply token a CONTROL or SET command returns on success.
pub const SUCCESS_TOKEN: &str = "ok";

/// How a command's reply is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Classification {
    /// Moves the drone or changes its mode; replies `ok` or `error`.
    Control,
    /// Queries a value; any reply counts as success.
    Read,
    /// Changes a setting; replies `ok` or `error`.
    Set,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Classification::Control => "control",
            Classification::Read => "read",
            Classification::Set => "set",
        };
        f.write_str(name)
    }
}

/// Declared decoding of a command's reply body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResultType {
    Text,
    Integer,
    Float,
}

impl std::fmt::Display for ResultType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResultType::Text => "string",
            ResultType::Integer => "integer",
            ResultType::Float => "float",
        };
        f.write_str(name)
    }
}

/// Static description of one command kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CommandSpec {
    /// Wire token, sent as the first word of the datagram
    pub name: &'static str,
    /// Number of arguments the command takes
    pub arity: usize,
    pub classification: Classification,
    pub result_type: ResultType,
}

impl CommandSpec {
    pub const fn new(
        name: &'static str,
        arity: usize,
        classification: Classification,
        result_type: ResultType,
    ) -> Self {
        Self { name, arity, classification, result_type }
    }

    /// CONTROL command replying with a status token.
    pub const fn control(name: &'static str, arity: usize) -> Self {
        Self::new(name, arity, Classification::Control, ResultType::Text)
    }

    /// SET command replying with a status token.
    pub const fn set(name: &'static str, arity: usize) -> Self {
        Self::new(name, arity, Classification::Set, ResultType::Text)
    }

    /// READ command without arguments.
    pub const fn read(name: &'static str, result_type: ResultType) -> Self {
        Self::new(name, 0, Classification::Read, result_type)
    }

    /// Fail with `ArityMismatch` unless `found` matches the declared arity.
    pub fn check_arity(&self, found: usize) -> Result<()> {
        if found == self.arity {
            Ok(())
        } else {
            Err(TelloError::ArityMismatch {
                name: self.name.to_string(),
                expected: self.arity,
                found,
            })
        }
    }

    /// Build the wire string: token and arguments joined by single spaces.
    pub fn construct<A: AsRef<str>>(&self, args: &[A]) -> String {
        let mut line = String::from(self.name);
        for arg in args {
            line.push(' ');
            line.push_str(arg.as_ref());
        }
        line.trim_end().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn wire_string_is_space_joined_without_trailing_whitespace(
            args in prop::collection::vec(-500i32..500, 0..5),
        ) {
            let spec = CommandSpec::control("go", args.len());
            let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
            let line = spec.construct(&rendered);

            prop_assert!(!line.ends_with(' '));
            let mut parts = line.split(' ');
            prop_assert_eq!(parts.next(), Some("go"));
            let rest: Vec<&str> = parts.collect();
            prop_assert_eq!(rest, rendered.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }

    #[test]
    fn zero_argument_command_has_no_trailing_space() {
        let spec = CommandSpec::control("takeoff", 0);
        assert_eq!(spec.construct::<&str>(&[]), "takeoff");
    }

    #[test]
    fn arity_is_enforced() {
        let spec = CommandSpec::control("up", 1);
        assert!(spec.check_arity(1).is_ok());
        let err = spec.check_arity(2).unwrap_err();
        assert!(matches!(err, TelloError::ArityMismatch { expected: 1, found: 2, .. }));
    }
}

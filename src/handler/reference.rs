use crate::error::ServerError;
use std::fmt;
use std::str::FromStr;

/// Separator between module and symbol in a configured handler reference
pub const REFERENCE_SEPARATOR: char = '.';

/// A parsed `<module>.<symbol>` handler reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerReference {
    /// Name of the unit to load from the code directory
    pub module_name: String,
    /// Name of the exported handler inside the unit
    pub symbol_name: String,
}

impl HandlerReference {
    /// Parse a reference, splitting on exactly one separator.
    ///
    /// Pure string validation: no file is touched.
    pub fn parse(reference: &str) -> Result<Self, ServerError> {
        let mut parts = reference.split(REFERENCE_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(module), Some(symbol), None) if !module.is_empty() && !symbol.is_empty() => {
                Ok(Self {
                    module_name: module.to_string(),
                    symbol_name: symbol.to_string(),
                })
            }
            _ => Err(ServerError::InvalidReference {
                reference: reference.to_string(),
            }),
        }
    }
}

impl FromStr for HandlerReference {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HandlerReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.module_name, REFERENCE_SEPARATOR, self.symbol_name
        )
    }
}

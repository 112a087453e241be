/// Results of mutating executor operations.
use std::fmt;

/// What a mutating operation did.
///
/// `Display` produces the literal strings existing clients parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `name` is now bound to `value`, or unbound when `value` is `None`.
    Binding { name: String, value: Option<String> },
    /// `unset` found nothing to remove. Nothing was recorded.
    NoBinding { name: String },
    /// `undo`/`redo` had nothing to consume.
    NoCommands,
    /// Everything was deleted.
    Cleaned,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Binding {
                name,
                value: Some(value),
            } => write!(f, "{name} = {value}"),
            Outcome::Binding { name, value: None } | Outcome::NoBinding { name } => {
                write!(f, "{name} = None")
            }
            Outcome::NoCommands => f.write_str("NO COMMANDS"),
            Outcome::Cleaned => f.write_str("CLEANED"),
        }
    }
}

/// Command-line request parsing and dispatch.
///
/// One request per line: a case-insensitive verb followed by
/// whitespace-separated arguments. Requests are validated here, so the
/// executor only ever sees complete name/value strings.
use anyhow::Result;
use thiserror::Error;
use varstore_core::CommandExecutor;

/// Reply printed for requests that fail validation.
pub const INVALID_INPUT: &str = "Invalid input";

/// A validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Set { name: String, value: String },
    Get { name: String },
    Unset { name: String },
    NumEqualTo { value: String },
    Undo,
    Redo,
    End,
    History,
    Status,
}

/// Why a request line was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Empty request")]
    Empty,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("{command} requires {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
}

impl Request {
    /// Parses one request from its words.
    ///
    /// Extra trailing words are ignored.
    pub fn parse<'a, I>(words: I) -> Result<Self, RequestError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut words = words.into_iter();
        let verb = words.next().ok_or(RequestError::Empty)?;
        let mut arg = |command: &'static str, argument: &'static str| {
            words
                .next()
                .map(str::to_string)
                .ok_or(RequestError::MissingArgument { command, argument })
        };

        let request = match verb.to_ascii_uppercase().as_str() {
            "SET" => {
                let name = arg("SET", "name")?;
                let value = arg("SET", "value")?;
                Request::Set { name, value }
            }
            "GET" => Request::Get {
                name: arg("GET", "name")?,
            },
            "UNSET" => Request::Unset {
                name: arg("UNSET", "name")?,
            },
            "NUMEQUALTO" => Request::NumEqualTo {
                value: arg("NUMEQUALTO", "value")?,
            },
            "UNDO" => Request::Undo,
            "REDO" => Request::Redo,
            "END" => Request::End,
            "HISTORY" => Request::History,
            "STATUS" => Request::Status,
            _ => return Err(RequestError::UnknownCommand(verb.to_string())),
        };
        Ok(request)
    }

    /// Parses a whole request line.
    pub fn parse_line(line: &str) -> Result<Self, RequestError> {
        Self::parse(line.split_whitespace())
    }

    /// Runs the request and renders the reply text.
    ///
    /// # Errors
    ///
    /// Returns an error if the executor fails to read or persist.
    pub fn execute(&self, exec: &CommandExecutor) -> Result<String> {
        let reply = match self {
            Request::Set { name, value } => exec.set(name, value)?.to_string(),
            Request::Get { name } => exec.get(name)?.unwrap_or_else(|| "None".to_string()),
            Request::Unset { name } => exec.unset(name)?.to_string(),
            Request::NumEqualTo { value } => exec.count_by_value(value)?.to_string(),
            Request::Undo => exec.undo()?.to_string(),
            Request::Redo => exec.redo()?.to_string(),
            Request::End => exec.clear_all()?.to_string(),
            Request::History => {
                let entries = exec.history()?;
                if entries.is_empty() {
                    "No history available".to_string()
                } else {
                    entries
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            Request::Status => {
                let bindings = exec.variables()?;
                if bindings.is_empty() {
                    "No variables set".to_string()
                } else {
                    bindings
                        .iter()
                        .map(|(name, value)| format!("{name} = {value}"))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
        };
        Ok(reply)
    }
}

/// Parses and runs one line, turning validation failures into the
/// `Invalid input` reply. Blank lines produce no reply.
///
/// # Errors
///
/// Returns an error only for executor failures.
pub fn handle_line(exec: &CommandExecutor, line: &str) -> Result<Option<String>> {
    match Request::parse_line(line) {
        Ok(request) => request.execute(exec).map(Some),
        Err(RequestError::Empty) => Ok(None),
        Err(e) => {
            tracing::debug!("Rejected request {line:?}: {e}");
            Ok(Some(INVALID_INPUT.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(exec: &CommandExecutor, line: &str) -> String {
        handle_line(exec, line)
            .expect("execute")
            .expect("reply")
    }

    #[test]
    fn test_parse_set() {
        let request = Request::parse_line("SET x 10").expect("parse");
        assert_eq!(
            request,
            Request::Set {
                name: "x".to_string(),
                value: "10".to_string()
            }
        );
    }

    #[test]
    fn test_parse_verb_case_insensitive() {
        assert_eq!(Request::parse_line("undo").expect("parse"), Request::Undo);
        assert_eq!(
            Request::parse_line("numEqualTo 5").expect("parse"),
            Request::NumEqualTo {
                value: "5".to_string()
            }
        );
    }

    #[test]
    fn test_parse_missing_value() {
        assert_eq!(
            Request::parse_line("SET x"),
            Err(RequestError::MissingArgument {
                command: "SET",
                argument: "value"
            })
        );
    }

    #[test]
    fn test_parse_missing_name() {
        assert!(matches!(
            Request::parse_line("GET"),
            Err(RequestError::MissingArgument { argument: "name", .. })
        ));
    }

    #[test]
    fn test_parse_unknown_and_empty() {
        assert_eq!(
            Request::parse_line("DROP x"),
            Err(RequestError::UnknownCommand("DROP".to_string()))
        );
        assert_eq!(Request::parse_line("   "), Err(RequestError::Empty));
    }

    #[test]
    fn test_handle_line_replies() {
        let exec = CommandExecutor::in_memory();
        assert_eq!(run(&exec, "SET a 10"), "a = 10");
        assert_eq!(run(&exec, "GET a"), "10");
        assert_eq!(run(&exec, "GET b"), "None");
        assert_eq!(run(&exec, "NUMEQUALTO 10"), "1");
        assert_eq!(run(&exec, "UNSET a"), "a = None");
        assert_eq!(run(&exec, "UNDO"), "a = 10");
        assert_eq!(run(&exec, "REDO"), "a = None");
        assert_eq!(run(&exec, "REDO"), "NO COMMANDS");
        assert_eq!(run(&exec, "END"), "CLEANED");
    }

    #[test]
    fn test_handle_line_invalid_input() {
        let exec = CommandExecutor::in_memory();
        assert_eq!(run(&exec, "SET a"), INVALID_INPUT);
        assert_eq!(run(&exec, "FLY"), INVALID_INPUT);
        assert!(handle_line(&exec, "").expect("execute").is_none());
    }

    #[test]
    fn test_listings() {
        let exec = CommandExecutor::in_memory();
        assert_eq!(run(&exec, "HISTORY"), "No history available");
        assert_eq!(run(&exec, "STATUS"), "No variables set");

        run(&exec, "SET b 2");
        run(&exec, "SET a 1");
        assert_eq!(run(&exec, "STATUS"), "a = 1\nb = 2");
        assert_eq!(
            run(&exec, "HISTORY"),
            "set b = 2 (Previous: None)\nset a = 1 (Previous: None)"
        );
    }
}

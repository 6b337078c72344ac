//! Line commands understood by the console.

use formbridge_api::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("'{0}' is not an index")]
    BadIndex(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Widget change at a path; the component comes from the render tree
    Set { path: String, value: Value },
    /// Native event routed through the component's event mapping
    Event {
        path: String,
        native: String,
        payload: Value,
    },
    Focus(String),
    Blur(String),
    Append { path: String, row: Option<Value> },
    Remove { path: String, index: usize },
    Move { path: String, from: usize, to: usize },
    Reset(Option<String>),
    Validate,
    Show,
    Json,
    Flush,
    Components,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  set <path> <value>            change a field (JSON or plain text)
  event <path> <native> [json]  send a native widget event
  focus <path> | blur <path>
  append <path> [json]          add a list row
  remove <path> <index>
  move <path> <from> <to>
  reset [path]
  validate | show | json | flush | components | help | quit";

/// JSON when it parses, plain text otherwise.
pub fn parse_value(text: &str) -> Value {
    Value::from_json_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn index(text: &str) -> Result<usize, ParseError> {
    text.parse()
        .map_err(|_| ParseError::BadIndex(text.to_string()))
}

impl std::str::FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let args: Vec<&str> = rest.split_whitespace().collect();

        match name {
            "" => Err(ParseError::Empty),
            "set" => {
                let (path, value) = rest
                    .split_once(char::is_whitespace)
                    .ok_or(ParseError::Usage("set <path> <value>"))?;
                Ok(Command::Set {
                    path: path.to_string(),
                    value: parse_value(value.trim()),
                })
            }
            "event" => {
                let mut parts = rest.splitn(3, char::is_whitespace);
                match (parts.next(), parts.next()) {
                    (Some(path), Some(native)) if !path.is_empty() => Ok(Command::Event {
                        path: path.to_string(),
                        native: native.to_string(),
                        payload: parts
                            .next()
                            .map(|p| parse_value(p.trim()))
                            .unwrap_or(Value::Null),
                    }),
                    _ => Err(ParseError::Usage("event <path> <native> [json]")),
                }
            }
            "focus" | "blur" => match args.as_slice() {
                [path] if name == "focus" => Ok(Command::Focus(path.to_string())),
                [path] => Ok(Command::Blur(path.to_string())),
                _ => Err(ParseError::Usage("focus|blur <path>")),
            },
            "append" => {
                let (path, row) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                if path.is_empty() {
                    return Err(ParseError::Usage("append <path> [json]"));
                }
                let row = row.trim();
                Ok(Command::Append {
                    path: path.to_string(),
                    row: (!row.is_empty()).then(|| parse_value(row)),
                })
            }
            "remove" => match args.as_slice() {
                [path, i] => Ok(Command::Remove {
                    path: path.to_string(),
                    index: index(i)?,
                }),
                _ => Err(ParseError::Usage("remove <path> <index>")),
            },
            "move" => match args.as_slice() {
                [path, from, to] => Ok(Command::Move {
                    path: path.to_string(),
                    from: index(from)?,
                    to: index(to)?,
                }),
                _ => Err(ParseError::Usage("move <path> <from> <to>")),
            },
            "reset" => Ok(Command::Reset(args.first().map(|p| p.to_string()))),
            "validate" => Ok(Command::Validate),
            "show" => Ok(Command::Show),
            "json" => Ok(Command::Json),
            "flush" => Ok(Command::Flush),
            "components" => Ok(Command::Components),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

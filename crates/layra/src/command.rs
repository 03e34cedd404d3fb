use std::error::Error;
use std::fmt::{self, Display};
use std::sync::Arc;

use layra_core::tree::ConversationBlock;

/// A line entered by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Sends the line as a message.
    Send(String),
    /// Shows the next branch at the given turn (1-based), or at the last
    /// turn if not given.
    Next(Option<usize>),
    /// Shows the previous branch at the given turn.
    Previous(Option<usize>),
    /// Prints the current thread again.
    Path,
    /// Fetches the history again.
    Reload,
    /// Exits the program.
    Quit,
}

/// Error returned by [`Command::parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The command name is not recognized.
    UnknownCommand(String),
    /// The turn argument is not a positive number.
    InvalidTurn(String),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnknownCommand(name) => {
                write!(f, "Unknown command: /{name}")
            }
            ParseError::InvalidTurn(arg) => {
                write!(f, "Invalid turn number: {arg}")
            }
        }
    }
}

impl Error for ParseError {}

impl Command {
    /// Parses an input line. Returns `Ok(None)` for a blank line.
    ///
    /// Lines starting with `/` are commands, `//` escapes a message that
    /// starts with a slash.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if line.starts_with("//") {
            return Ok(Some(Command::Send(line[1..].to_owned())));
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Some(Command::Send(line.to_owned())));
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let arg = parts.next();
        let command = match name {
            "next" | "n" => Command::Next(parse_turn(arg)?),
            "prev" | "p" => Command::Previous(parse_turn(arg)?),
            "path" => Command::Path,
            "reload" => Command::Reload,
            "quit" | "q" => Command::Quit,
            _ => return Err(ParseError::UnknownCommand(name.to_owned())),
        };
        Ok(Some(command))
    }
}

fn parse_turn(arg: Option<&str>) -> Result<Option<usize>, ParseError> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    match arg.parse::<usize>() {
        Ok(turn) if turn > 0 => Ok(Some(turn)),
        _ => Err(ParseError::InvalidTurn(arg.to_owned())),
    }
}

/// Returns the parent id of the fork the given turn (1-based) of `path`
/// belongs to. The last turn is used if `turn` is `None`.
pub fn fork_of_turn(
    path: &[Arc<ConversationBlock>],
    turn: Option<usize>,
) -> Option<&str> {
    let block = match turn {
        Some(turn) => path.get(turn.checked_sub(1)?)?,
        None => path.last()?,
    };
    Some(block.parent_id.as_str())
}

/// Waits for the next input line, or `None` when `interrupt` resolves
/// first or the input ends.
pub async fn next_line<R, I>(read: R, interrupt: I) -> Option<String>
where
    R: Future<Output = Option<String>>,
    I: Future<Output = ()>,
{
    tokio::select! {
        line = read => line,
        _ = interrupt => None,
    }
}

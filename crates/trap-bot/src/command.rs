//! Operator command parser.
//!
//! One command per line:
//!
//! ```text
//! buy <symbol>        start a cycle favoring BUY
//! sell <symbol>       start a cycle favoring SELL
//! status <symbol>     show one symbol
//! statusall           show every symbol
//! closeall <symbol>   conclude one symbol's cycle
//! closeall all        conclude every cycle
//! metrics             dump Prometheus metrics
//! exit                shut down
//! ```
//!
//! Symbols are left as typed; alias resolution happens against the
//! configured symbols.

use thiserror::Error;
use trap_core::OrderSide;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseTarget {
    Symbol(String),
    All,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start { favored: OrderSide, symbol: String },
    Status(String),
    StatusAll,
    CloseAll(CloseTarget),
    Metrics,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),

    #[error("'{0}' needs a symbol or alias")]
    MissingSymbol(&'static str),

    #[error("Unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

pub const HELP: &str =
    "Commands: buy <sym> | sell <sym> | status <sym> | statusall | closeall <sym|all> | metrics | exit";

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(action) = words.next() else {
        return Ok(None);
    };
    let action = action.to_ascii_lowercase();
    let argument = words.next();
    if let Some(extra) = words.next() {
        return Err(ParseError::UnexpectedArgument(extra.to_string()));
    }

    let command = match action.as_str() {
        "buy" => Command::Start {
            favored: OrderSide::Buy,
            symbol: required(argument, "buy")?,
        },
        "sell" => Command::Start {
            favored: OrderSide::Sell,
            symbol: required(argument, "sell")?,
        },
        "status" => match argument {
            Some(arg) if arg.eq_ignore_ascii_case("all") => Command::StatusAll,
            _ => Command::Status(required(argument, "status")?),
        },
        "statusall" => no_argument(argument, Command::StatusAll)?,
        "closeall" => match required(argument, "closeall")? {
            arg if arg.eq_ignore_ascii_case("all") => Command::CloseAll(CloseTarget::All),
            arg => Command::CloseAll(CloseTarget::Symbol(arg)),
        },
        "metrics" => no_argument(argument, Command::Metrics)?,
        "help" | "?" => Command::Help,
        "exit" | "quit" => no_argument(argument, Command::Exit)?,
        _ => return Err(ParseError::UnknownCommand(action)),
    };
    Ok(Some(command))
}

fn required(argument: Option<&str>, action: &'static str) -> Result<String, ParseError> {
    argument
        .map(str::to_string)
        .ok_or(ParseError::MissingSymbol(action))
}

fn no_argument(argument: Option<&str>, command: Command) -> Result<Command, ParseError> {
    match argument {
        Some(arg) => Err(ParseError::UnexpectedArgument(arg.to_string())),
        None => Ok(command),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_commands() {
        assert_eq!(
            parse("buy gold").unwrap(),
            Some(Command::Start {
                favored: OrderSide::Buy,
                symbol: "gold".to_string()
            })
        );
        assert_eq!(
            parse("  SELL   EURUSDc ").unwrap(),
            Some(Command::Start {
                favored: OrderSide::Sell,
                symbol: "EURUSDc".to_string()
            })
        );
    }

    #[test]
    fn test_status_commands() {
        assert_eq!(
            parse("status btc").unwrap(),
            Some(Command::Status("btc".to_string()))
        );
        assert_eq!(parse("statusall").unwrap(), Some(Command::StatusAll));
        assert_eq!(parse("status all").unwrap(), Some(Command::StatusAll));
    }

    #[test]
    fn test_closeall_targets() {
        assert_eq!(
            parse("closeall ALL").unwrap(),
            Some(Command::CloseAll(CloseTarget::All))
        );
        assert_eq!(
            parse("closeall xau").unwrap(),
            Some(Command::CloseAll(CloseTarget::Symbol("xau".to_string())))
        );
    }

    #[test]
    fn test_blank_line() {
        assert_eq!(parse("").unwrap(), None);
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse("buy"), Err(ParseError::MissingSymbol("buy")));
        assert_eq!(parse("closeall"), Err(ParseError::MissingSymbol("closeall")));
        assert_eq!(
            parse("hedge eur"),
            Err(ParseError::UnknownCommand("hedge".to_string()))
        );
        assert_eq!(
            parse("exit now"),
            Err(ParseError::UnexpectedArgument("now".to_string()))
        );
        assert_eq!(
            parse("buy eur gold"),
            Err(ParseError::UnexpectedArgument("gold".to_string()))
        );
    }

    #[test]
    fn test_exit_aliases() {
        assert_eq!(parse("exit").unwrap(), Some(Command::Exit));
        assert_eq!(parse("QUIT").unwrap(), Some(Command::Exit));
    }
}

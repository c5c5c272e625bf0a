//! Management commands typed into the interactive client.
//!
//! Arguments are validated here so that nothing malformed is ever sent to
//! the daemon.

use crate::domain::attempt::{parse_address, LimitParam};
use crate::domain::error::InputError;
use crate::domain::rule::{parse_network, RuleVerdict};
use crate::infrastructure::protocol::{Request, Response};
use ipnetwork::IpNetwork;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("command not specified")]
    Empty,
    #[error("{0}: unknown command")]
    Unknown(String),
    #[error("{command}: wrong arguments count, usage: {usage}")]
    WrongArgsCount {
        command: &'static str,
        usage: &'static str,
    },
    #[error("list must be white or black, got {0:?}")]
    InvalidList(String),
    #[error("reset parameter must be login or ip, got {0:?}")]
    InvalidResetParameter(String),
    #[error(transparent)]
    Input(#[from] InputError),
}

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add {
        verdict: RuleVerdict,
        network: IpNetwork,
    },
    Remove {
        verdict: RuleVerdict,
        network: IpNetwork,
    },
    Reset {
        parameter: LimitParam,
        value: String,
    },
    List {
        verdict: Option<RuleVerdict>,
    },
    Help,
    Quit,
}

const COMMANDS: &[(&str, &str, &str)] = &[
    (
        "add",
        "add <white|black> <network>",
        "Add a network to a list. Example: add white 192.168.2.0/24",
    ),
    (
        "rm",
        "rm <white|black> <network>",
        "Remove a network from a list. Example: rm black 10.0.0.0/8",
    ),
    (
        "reset",
        "reset <login|ip> <value>",
        "Reset a bucket. Example: reset ip 192.168.0.1",
    ),
    (
        "list",
        "list [white|black]",
        "Show listed networks",
    ),
    ("help", "help", "Show this help"),
    ("quit", "quit", "Exit"),
];

fn usage(command: &'static str) -> &'static str {
    COMMANDS
        .iter()
        .find(|(name, _, _)| *name == command)
        .map(|(_, usage, _)| *usage)
        .unwrap_or(command)
}

fn list_verdict(name: &str) -> Result<RuleVerdict, CommandError> {
    match name {
        "white" | "black" => RuleVerdict::from_list_name(name).map_err(CommandError::from),
        other => Err(CommandError::InvalidList(other.to_string())),
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, rest)) = args.split_first() else {
            return Err(CommandError::Empty);
        };

        match name {
            "add" | "rm" => {
                let command = if name == "add" { "add" } else { "rm" };
                let [list, network] = rest else {
                    return Err(CommandError::WrongArgsCount {
                        command,
                        usage: usage(command),
                    });
                };
                let verdict = list_verdict(list)?;
                let network = parse_network(network)?;
                Ok(if name == "add" {
                    Command::Add { verdict, network }
                } else {
                    Command::Remove { verdict, network }
                })
            }
            "reset" => {
                let [parameter, value] = rest else {
                    return Err(CommandError::WrongArgsCount {
                        command: "reset",
                        usage: usage("reset"),
                    });
                };
                let (parameter, value) = match *parameter {
                    "login" => (LimitParam::Login, value.to_string()),
                    "ip" => (LimitParam::Ip, parse_address(value)?.to_string()),
                    other => return Err(CommandError::InvalidResetParameter(other.to_string())),
                };
                Ok(Command::Reset { parameter, value })
            }
            "list" => match rest {
                [] => Ok(Command::List { verdict: None }),
                [list] => Ok(Command::List {
                    verdict: Some(list_verdict(list)?),
                }),
                _ => Err(CommandError::WrongArgsCount {
                    command: "list",
                    usage: usage("list"),
                }),
            },
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

impl Command {
    /// Wire request for this command; `None` for local commands.
    pub fn to_request(&self) -> Option<Request> {
        match self {
            Command::Add { verdict, network } => Some(Request::AddRule {
                verdict: verdict.to_string(),
                network: network.to_string(),
            }),
            Command::Remove { verdict, network } => Some(Request::DeleteRule {
                verdict: verdict.to_string(),
                network: network.to_string(),
            }),
            Command::Reset { parameter, value } => Some(Request::Reset {
                parameter: parameter.to_string(),
                value: value.clone(),
            }),
            Command::List { verdict } => Some(Request::ListRules {
                verdict: verdict.map(|v| v.to_string()),
            }),
            Command::Help | Command::Quit => None,
        }
    }

    /// Human-readable outcome of a successful response.
    pub fn describe(&self, response: &Response) -> String {
        match self {
            Command::Add { network, .. } => match &response.rule {
                Some(rule) => format!("{network} added ({})", rule.id),
                None => format!("{network} added"),
            },
            Command::Remove { network, .. } => format!("{network} removed"),
            Command::Reset { parameter, value } => {
                if response.found == Some(true) {
                    format!("{parameter} {value} reset")
                } else {
                    format!("no bucket for {parameter} {value}")
                }
            }
            Command::List { .. } => {
                let rules = response.rules.as_deref().unwrap_or_default();
                if rules.is_empty() {
                    return "no rules".to_string();
                }
                rules
                    .iter()
                    .map(|r| format!("{:<5} {}", r.verdict.as_str(), r.network))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Command::Help | Command::Quit => String::new(),
        }
    }
}

/// Help text listing every command.
pub fn help() -> String {
    let mut text = String::from("Available commands:\n");
    for (name, _, desc) in COMMANDS {
        text.push_str(&format!(" - {name:<7}{desc}\n"));
    }
    text
}

/// Line printed for a rejected command or a failed request.
pub fn error_line(message: impl std::fmt::Display) -> String {
    format!("Error: {message}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_and_rm() {
        assert_eq!(
            "add white 192.168.2.0/24".parse::<Command>().unwrap(),
            Command::Add {
                verdict: RuleVerdict::Allow,
                network: parse_network("192.168.2.0/24").unwrap()
            }
        );
        assert_eq!(
            "  rm   black 10.0.0.0/8 ".parse::<Command>().unwrap(),
            Command::Remove {
                verdict: RuleVerdict::Deny,
                network: parse_network("10.0.0.0/8").unwrap()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<Command>().unwrap_err(), CommandError::Empty);
        assert_eq!(
            "drop x".parse::<Command>().unwrap_err(),
            CommandError::Unknown("drop".into())
        );
        assert!(matches!(
            "add white".parse::<Command>().unwrap_err(),
            CommandError::WrongArgsCount { command: "add", .. }
        ));
        assert!(matches!(
            "add white 10.0.0.0/8 extra".parse::<Command>().unwrap_err(),
            CommandError::WrongArgsCount { .. }
        ));
        assert_eq!(
            "add grey 10.0.0.0/8".parse::<Command>().unwrap_err(),
            CommandError::InvalidList("grey".into())
        );
        // Canonical verdict names are not list names.
        assert_eq!(
            "add allow 10.0.0.0/8".parse::<Command>().unwrap_err(),
            CommandError::InvalidList("allow".into())
        );
        assert!(matches!(
            "rm black 10.0.0.300/8".parse::<Command>().unwrap_err(),
            CommandError::Input(InputError::MalformedNetwork { .. })
        ));
        assert_eq!(
            "reset password x".parse::<Command>().unwrap_err(),
            CommandError::InvalidResetParameter("password".into())
        );
        assert!(matches!(
            "reset ip 10.0.0".parse::<Command>().unwrap_err(),
            CommandError::Input(InputError::MalformedAddress { .. })
        ));
    }

    #[test]
    fn test_parse_reset_and_local() {
        assert_eq!(
            "reset ip 192.168.0.1".parse::<Command>().unwrap(),
            Command::Reset {
                parameter: LimitParam::Ip,
                value: "192.168.0.1".into()
            }
        );
        assert_eq!(
            "reset ip ::FFFF:192.168.0.1".parse::<Command>().unwrap(),
            Command::Reset {
                parameter: LimitParam::Ip,
                value: "192.168.0.1".into()
            }
        );
        assert_eq!("quit".parse::<Command>().unwrap(), Command::Quit);
        assert_eq!("help".parse::<Command>().unwrap(), Command::Help);
        assert_eq!(
            "list black".parse::<Command>().unwrap(),
            Command::List {
                verdict: Some(RuleVerdict::Deny)
            }
        );
    }

    #[test]
    fn test_to_request() {
        let cmd: Command = "add black 10.1.2.3/16".parse().unwrap();
        assert_eq!(
            cmd.to_request(),
            Some(Request::AddRule {
                verdict: "deny".into(),
                network: "10.1.0.0/16".into()
            })
        );

        let cmd: Command = "reset login alice".parse().unwrap();
        assert_eq!(
            cmd.to_request(),
            Some(Request::Reset {
                parameter: "login".into(),
                value: "alice".into()
            })
        );
        assert_eq!(Command::Quit.to_request(), None);
    }

    #[test]
    fn test_help_lists_commands() {
        let text = help();
        for name in ["add", "rm", "reset", "list", "quit"] {
            assert!(text.contains(&format!(" - {name}")));
        }
    }

    #[test]
    fn test_error_line() {
        let err = "frobnicate".parse::<Command>().unwrap_err();
        assert_eq!(error_line(&err), "Error: frobnicate: unknown command");
        assert_eq!(error_line("rule not found"), "Error: rule not found");
    }
}

//! Simulated command handlers.
//!
//! The set of commands is closed: [`handler_for`] is the only way a command
//! name reaches code, and every handler has the same [`Handler`] signature.
//! Handlers must be total. Domain failures (missing file, bad flag) are
//! returned as error [`SimulatedOutput`]s; a [`CommandFault`] is reserved for
//! an environment the handler cannot make sense of.

mod filesystem;
mod manual;
mod network;
mod system;

use std::any::Any;
use thiserror::Error;

use super::{EnvironmentSimulator, SimulatedOutput};

pub type HandlerResult = Result<SimulatedOutput, CommandFault>;
pub type Handler = fn(&mut EnvironmentSimulator, &[String]) -> HandlerResult;

#[derive(Debug, Error)]
pub enum CommandFault {
    #[error("malformed environment: {0}")]
    MalformedEnvironment(String),
    #[error("{0}")]
    Internal(String),
}

impl CommandFault {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            message.to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "command handler failed".to_string()
        };
        CommandFault::Internal(message)
    }
}

pub const IMPLEMENTED_COMMANDS: &[&str] = &[
    "ls", "dir", "cd", "pwd", "cat", "head", "tail", "grep", "find",
    "echo", "whoami", "id", "hostname", "uname", "date", "cal",
    "nmap", "ping", "traceroute", "netstat", "curl", "wget",
    "ssh", "nc", "nslookup", "dig", "whois",
    "file", "strings", "base64", "md5sum", "sha256sum",
    "history", "clear", "help", "man",
];

pub fn handler_for(command: &str) -> Option<Handler> {
    let handler: Handler = match command {
        "ls" | "dir" => filesystem::ls,
        "cd" => filesystem::cd,
        "pwd" => filesystem::pwd,
        "cat" => filesystem::cat,
        "head" => filesystem::head,
        "tail" => filesystem::tail,
        "grep" => filesystem::grep,
        "find" => filesystem::find,
        "file" => filesystem::file,
        "strings" => filesystem::strings,
        "md5sum" => filesystem::md5sum,
        "sha256sum" => filesystem::sha256sum,
        "echo" => system::echo,
        "whoami" => system::whoami,
        "id" => system::id,
        "hostname" => system::hostname,
        "uname" => system::uname,
        "date" => system::date,
        "cal" => system::cal,
        "base64" => system::base64,
        "history" => system::history,
        "clear" => system::clear,
        "nmap" => network::nmap,
        "ping" => network::ping,
        "traceroute" => network::traceroute,
        "netstat" => network::netstat,
        "curl" => network::curl,
        "wget" => network::wget,
        "ssh" => network::ssh,
        "nc" => network::nc,
        "nslookup" => network::nslookup,
        "dig" => network::dig,
        "whois" => network::whois,
        "help" => manual::help,
        "man" => manual::man,
        _ => return None,
    };
    Some(handler)
}

/// Splits `args` into single-letter flags and operands. `--` ends flag
/// parsing; a lone `-` is an operand.
pub(crate) fn split_flags(args: &[String]) -> (Vec<char>, Vec<&str>) {
    let mut flags = Vec::new();
    let mut operands = Vec::new();
    let mut flags_done = false;

    for arg in args {
        if !flags_done && arg == "--" {
            flags_done = true;
        } else if !flags_done && arg.len() > 1 && arg.starts_with('-') {
            flags.extend(arg.chars().skip(1));
        } else {
            operands.push(arg.as_str());
        }
    }

    (flags, operands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::shell::tests::{run, simulator};
    use crate::sandbox::DEFAULT_WHITELIST;
    use proptest::prelude::*;

    #[test]
    fn test_every_implemented_command_has_handler() {
        for command in IMPLEMENTED_COMMANDS {
            assert!(handler_for(command).is_some(), "{} has no handler", command);
            assert!(DEFAULT_WHITELIST.contains(command), "{} is not whitelisted", command);
        }
        assert!(handler_for("telnet").is_none());
        assert!(handler_for("rm").is_none());
    }

    #[test]
    fn test_split_flags() {
        let args: Vec<String> = ["-la", "docs", "--", "-n"].iter().map(|s| s.to_string()).collect();
        let (flags, operands) = split_flags(&args);
        assert_eq!(flags, vec!['l', 'a']);
        assert_eq!(operands, vec!["docs", "-n"]);
    }

    #[test]
    fn test_panic_payload_message() {
        let fault = CommandFault::from_panic(&"boom");
        assert_eq!(fault.to_string(), "boom");
    }

    #[test]
    fn test_handlers_accept_empty_and_single_args() {
        for command in IMPLEMENTED_COMMANDS {
            let mut sim = simulator();
            let handler = handler_for(command).unwrap();
            assert!(handler(&mut sim, &[]).is_ok(), "{} failed with no args", command);
            assert!(handler(&mut sim, &["x".to_string()]).is_ok(), "{} failed with one arg", command);
        }
    }

    proptest! {
        #[test]
        fn prop_handlers_never_fault(
            command in proptest::sample::select(IMPLEMENTED_COMMANDS.to_vec()),
            args in proptest::collection::vec("[-a-zA-Z0-9_./=]{0,12}", 0..10),
        ) {
            let mut sim = simulator();
            let handler = handler_for(command).unwrap();
            let result = handler(&mut sim, &args);
            prop_assert!(result.is_ok());
        }

        #[test]
        fn prop_execute_always_returns_output(input in "[ -~]{0,40}") {
            let mut sim = simulator();
            let output = run(&mut sim, &input);
            prop_assert!(output.return_code == 0 || output.return_code == 1 || output.return_code == 127);
        }
    }
}

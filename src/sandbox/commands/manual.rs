use super::HandlerResult;
use crate::sandbox::{EnvironmentSimulator, SimulatedOutput};

const HELP_TEXT: &str = "Terminal Academy Lab Environment

Available commands:
  ls, cd, pwd, cat, head, tail, grep, find, echo
  whoami, id, hostname, uname, date, cal
  nmap, ping, traceroute, netstat, curl, wget
  ssh, nc, nslookup, dig, whois
  file, strings, base64, md5sum, sha256sum
  history, clear, help, man

Type 'man <command>' for detailed help on a specific command.";

const MAN_NMAP: &str = "NMAP(1)                          Nmap Reference Guide

NAME
       nmap - Network exploration tool and security / port scanner

SYNOPSIS
       nmap [Options] target

DESCRIPTION
       Nmap is a utility for network discovery and security auditing.

       In this simulated environment, nmap will scan pre-configured
       target systems and return realistic-looking results.

OPTIONS
       -p PORTS
              Only report the given ports, e.g. 22,80 or 1-1024.

EXAMPLES
       nmap target
       nmap -sV target
       nmap -p 22,80,443 target
";

const MAN_GREP: &str = "GREP(1)                          User Commands

NAME
       grep - print lines that match patterns

SYNOPSIS
       grep PATTERN FILE...

DESCRIPTION
       grep searches for PATTERN in each FILE. Matching ignores case.
       With more than one FILE, each line is prefixed with its file name.
";

const MAN_LS: &str = "LS(1)                            User Commands

NAME
       ls - list directory contents

SYNOPSIS
       ls [-a] [-l] [FILE]

DESCRIPTION
       List information about the FILE (the current directory by default).

       -a     also list the . and .. entries
       -l     use a long listing format
";

const MAN_CAT: &str = "CAT(1)                           User Commands

NAME
       cat - concatenate files and print on the standard output

SYNOPSIS
       cat FILE...

DESCRIPTION
       Concatenate FILE(s) to standard output.
";

const MAN_BASE64: &str = "BASE64(1)                        User Commands

NAME
       base64 - base64 encode/decode data

SYNOPSIS
       base64 [-d] TEXT

DESCRIPTION
       Base64 encode or decode TEXT.

       -d, --decode
              decode data
";

pub(super) fn help(_sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(HELP_TEXT))
}

pub(super) fn man(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let topic = match args.first() {
        Some(topic) => topic.to_lowercase(),
        None => return Ok(SimulatedOutput::error("Usage: man command")),
    };

    let page = match topic.as_str() {
        "nmap" => MAN_NMAP,
        "grep" => MAN_GREP,
        "ls" => MAN_LS,
        "cat" => MAN_CAT,
        "base64" => MAN_BASE64,
        _ => return Ok(SimulatedOutput::error(format!("No manual entry for {}", topic))),
    };

    Ok(SimulatedOutput::ok(page))
}

#[cfg(test)]
mod tests {
    use crate::sandbox::shell::tests::{run, simulator};

    #[test]
    fn test_help_lists_commands() {
        let mut sim = simulator();
        let output = run(&mut sim, "help");
        assert!(output.output.starts_with("Terminal Academy Lab Environment"));
        assert!(output.output.contains("nmap, ping, traceroute"));
    }

    #[test]
    fn test_man_pages() {
        let mut sim = simulator();
        for topic in ["nmap", "grep", "ls", "cat", "base64", "NMAP"] {
            let page = run(&mut sim, &format!("man {}", topic));
            assert_eq!(page.return_code, 0, "man {}", topic);
            assert!(page.output.contains("NAME"));
        }

        let missing = run(&mut sim, "man tar");
        assert_eq!(missing.output, "No manual entry for tar");
        assert_eq!(missing.return_code, 1);
        assert!(missing.is_error);

        assert!(run(&mut sim, "man").is_error);
    }
}

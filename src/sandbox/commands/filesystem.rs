use sha2::{Digest, Sha256};

use super::{split_flags, HandlerResult};
use crate::sandbox::{join_path, EnvironmentSimulator, Node, SimulatedOutput};

const DEFAULT_LINE_COUNT: usize = 10;
const LONG_FORMAT_TIMESTAMP: &str = "Jan 15 10:00";
const DIRECTORY_SIZE: usize = 4096;
const MIN_STRING_LENGTH: usize = 4;
// The simulated md5sum always reports the digest of empty input.
const SIMULATED_MD5: &str = "d41d8cd98f00b204e9800998ecf8427e";

pub(super) fn ls(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let (flags, operands) = split_flags(args);
    let mut show_all = false;
    let mut long_format = false;

    for flag in flags {
        match flag {
            'a' => show_all = true,
            'l' => long_format = true,
            other => return Ok(SimulatedOutput::error(format!("ls: invalid option -- '{}'", other))),
        }
    }

    let path = operands.first().copied().unwrap_or(".");
    let resolved = sim.resolve(path);

    let children = match sim.filesystem().get(&resolved) {
        None => {
            return Ok(SimulatedOutput::error(format!(
                "ls: cannot access '{}': No such file or directory",
                path
            )));
        }
        Some(Node::File { .. }) => return Ok(SimulatedOutput::ok(path)),
        Some(Node::Directory { children }) => children.clone(),
    };

    let mut entries: Vec<String> = Vec::with_capacity(children.len() + 2);
    if show_all {
        entries.push(".".to_string());
        entries.push("..".to_string());
    }
    entries.extend(children);

    if !long_format {
        return Ok(SimulatedOutput::ok(entries.join("  ")));
    }

    let user = sim.user().to_string();
    let lines: Vec<String> = entries
        .iter()
        .map(|entry| {
            let (is_dir, size) = if entry == "." || entry == ".." {
                (true, DIRECTORY_SIZE)
            } else {
                match sim.filesystem().get(&join_path(&resolved, entry)) {
                    Some(Node::Directory { .. }) => (true, DIRECTORY_SIZE),
                    Some(Node::File { content }) => (false, content.len()),
                    // Listed but never authored: show it as an empty file.
                    None => (false, 0),
                }
            };
            let permissions = if is_dir { "drwxr-xr-x" } else { "-rw-r--r--" };
            format!(
                "{} 1 {} {} {:>8} {} {}",
                permissions, user, user, size, LONG_FORMAT_TIMESTAMP, entry
            )
        })
        .collect();

    Ok(SimulatedOutput::ok(lines.join("\n")))
}

pub(super) fn cd(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let target = match args.first() {
        Some(target) => target,
        None => {
            let home = format!("/home/{}", sim.user());
            sim.set_current_directory(home);
            return Ok(SimulatedOutput::ok(""));
        }
    };

    let resolved = sim.resolve(target);
    match sim.filesystem().get(&resolved) {
        None => Ok(SimulatedOutput::error(format!("cd: {}: No such file or directory", target))),
        Some(Node::File { .. }) => Ok(SimulatedOutput::error(format!("cd: {}: Not a directory", target))),
        Some(Node::Directory { .. }) => {
            sim.set_current_directory(resolved);
            Ok(SimulatedOutput::ok(""))
        }
    }
}

pub(super) fn pwd(sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(sim.current_directory()))
}

pub(super) fn cat(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    if args.is_empty() {
        return Ok(SimulatedOutput::error("cat: missing file operand"));
    }

    let mut failed = false;
    let mut outputs = Vec::with_capacity(args.len());

    for path in args {
        match sim.lookup(path) {
            None => {
                failed = true;
                outputs.push(format!("cat: {}: No such file or directory", path));
            }
            Some(Node::Directory { .. }) => {
                failed = true;
                outputs.push(format!("cat: {}: Is a directory", path));
            }
            Some(Node::File { content }) => outputs.push(content.clone()),
        }
    }

    let output = outputs.join("\n");
    if failed {
        Ok(SimulatedOutput::error(output))
    } else {
        Ok(SimulatedOutput::ok(output))
    }
}

pub(super) fn head(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    slice_lines(sim, "head", args, |lines, count| lines.into_iter().take(count).collect())
}

pub(super) fn tail(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    slice_lines(sim, "tail", args, |lines, count| {
        let skip = lines.len().saturating_sub(count);
        lines.into_iter().skip(skip).collect()
    })
}

fn slice_lines<F>(sim: &mut EnvironmentSimulator, name: &str, args: &[String], select: F) -> HandlerResult
where
    F: Fn(Vec<&str>, usize) -> Vec<&str>,
{
    let mut count = DEFAULT_LINE_COUNT;
    let mut files = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if arg == "-n" {
            let value = match iter.next() {
                Some(value) => value,
                None => {
                    return Ok(SimulatedOutput::error(format!(
                        "{}: option requires an argument -- 'n'",
                        name
                    )));
                }
            };
            count = match value.parse::<usize>() {
                Ok(count) => count,
                Err(_) => {
                    return Ok(SimulatedOutput::error(format!(
                        "{}: invalid number of lines: '{}'",
                        name, value
                    )));
                }
            };
        } else if arg.len() > 1 && arg.starts_with('-') {
            return Ok(SimulatedOutput::error(format!("{}: invalid option -- '{}'", name, &arg[1..])));
        } else {
            files.push(arg.clone());
        }
    }

    if files.is_empty() {
        return Ok(SimulatedOutput::error(format!("{}: missing file operand", name)));
    }

    // Operands are concatenated the way cat prints them, then sliced.
    let result = cat(sim, &files)?;
    if result.is_error {
        return Ok(result);
    }

    let lines: Vec<&str> = result.output.split('\n').collect();
    Ok(SimulatedOutput::ok(select(lines, count).join("\n")))
}

/// Case-insensitive substring search. No match is exit status 1 without
/// being an error, like the real tool.
pub(super) fn grep(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    if args.len() < 2 {
        return Ok(SimulatedOutput::error("Usage: grep PATTERN FILE"));
    }

    let pattern = args[0].to_lowercase();
    let files = &args[1..];
    let prefix_names = files.len() > 1;
    let mut matches = Vec::new();

    for path in files {
        if let Some(Node::File { content }) = sim.lookup(path) {
            for line in content.split('\n') {
                if line.to_lowercase().contains(&pattern) {
                    if prefix_names {
                        matches.push(format!("{}:{}", path, line));
                    } else {
                        matches.push(line.to_string());
                    }
                }
            }
        }
    }

    if matches.is_empty() {
        Ok(SimulatedOutput::status("", 1))
    } else {
        Ok(SimulatedOutput::ok(matches.join("\n")))
    }
}

pub(super) fn find(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let start = args.first().map(String::as_str).unwrap_or(".");
    let resolved = sim.resolve(start);

    // Plain string prefix, so a partial name matches and no start path errors.
    // BTreeMap keys are already in lexicographic order.
    let results: Vec<&str> = sim
        .filesystem()
        .keys()
        .filter(|path| path.starts_with(&resolved))
        .map(String::as_str)
        .collect();

    Ok(SimulatedOutput::ok(results.join("\n")))
}

pub(super) fn file(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let path = match args.first() {
        Some(path) => path,
        None => return Ok(SimulatedOutput::error("Usage: file filename")),
    };

    let description = match sim.lookup(path) {
        None => return Ok(SimulatedOutput::error(format!("{}: cannot open (No such file)", path))),
        Some(Node::Directory { .. }) => "directory",
        Some(Node::File { content }) if content.is_empty() => "empty",
        Some(Node::File { content }) if content.is_ascii() => "ASCII text",
        Some(Node::File { .. }) => "UTF-8 Unicode text",
    };

    Ok(SimulatedOutput::ok(format!("{}: {}", path, description)))
}

pub(super) fn strings(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let path = match args.first() {
        Some(path) => path,
        None => return Ok(SimulatedOutput::error("Usage: strings filename")),
    };

    let content = match sim.lookup(path) {
        None => return Ok(SimulatedOutput::error(format!("strings: '{}': No such file", path))),
        Some(Node::Directory { .. }) => {
            return Ok(SimulatedOutput::error(format!("strings: {}: Is a directory", path)));
        }
        Some(Node::File { content }) => content,
    };

    let runs: Vec<&str> = content
        .split(|c: char| !(c.is_ascii_graphic() || c == ' ' || c == '\t'))
        .filter(|run| run.len() >= MIN_STRING_LENGTH)
        .collect();

    Ok(SimulatedOutput::ok(runs.join("\n")))
}

pub(super) fn md5sum(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    checksum(sim, "md5sum", args, |_| SIMULATED_MD5.to_string())
}

pub(super) fn sha256sum(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    checksum(sim, "sha256sum", args, |content| hex::encode(Sha256::digest(content.as_bytes())))
}

fn checksum<F>(sim: &mut EnvironmentSimulator, name: &str, args: &[String], digest: F) -> HandlerResult
where
    F: Fn(&str) -> String,
{
    if args.is_empty() {
        return Ok(SimulatedOutput::error(format!("Usage: {} filename", name)));
    }

    let mut failed = false;
    let mut lines = Vec::with_capacity(args.len());

    for path in args {
        match sim.lookup(path) {
            Some(Node::File { content }) => lines.push(format!("{}  {}", digest(content), path)),
            Some(Node::Directory { .. }) => {
                failed = true;
                lines.push(format!("{}: {}: Is a directory", name, path));
            }
            None => {
                failed = true;
                lines.push(format!("{}: {}: No such file or directory", name, path));
            }
        }
    }

    let output = lines.join("\n");
    if failed {
        Ok(SimulatedOutput::error(output))
    } else {
        Ok(SimulatedOutput::ok(output))
    }
}

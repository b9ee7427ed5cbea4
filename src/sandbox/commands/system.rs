use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Datelike, NaiveDate};

use super::{split_flags, HandlerResult};
use crate::sandbox::{EnvironmentSimulator, SimulatedOutput};

const KERNEL_RELEASE: &str = "5.15.0-generic";
const HISTORY_WINDOW: usize = 50;
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const CALENDAR_WIDTH: usize = 20;

pub(super) fn echo(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(args.join(" ")))
}

pub(super) fn whoami(sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(sim.user()))
}

pub(super) fn id(sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    let user = sim.user();
    Ok(SimulatedOutput::ok(format!(
        "uid=1000({user}) gid=1000({user}) groups=1000({user})",
        user = user
    )))
}

pub(super) fn hostname(sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(sim.hostname()))
}

pub(super) fn uname(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let (flags, _) = split_flags(args);
    if flags.contains(&'a') {
        return Ok(SimulatedOutput::ok(format!(
            "Linux {} {} #1 SMP x86_64 GNU/Linux",
            sim.hostname(),
            KERNEL_RELEASE
        )));
    }
    if flags.contains(&'r') {
        return Ok(SimulatedOutput::ok(KERNEL_RELEASE));
    }
    Ok(SimulatedOutput::ok("Linux"))
}

pub(super) fn date(sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(sim.now().format("%a %b %d %H:%M:%S UTC %Y").to_string()))
}

/// Month view of the simulator clock, Sunday first.
pub(super) fn cal(sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    let today = sim.now().date_naive();
    let first = match NaiveDate::from_ymd_opt(today.year(), today.month(), 1) {
        Some(first) => first,
        None => return Ok(SimulatedOutput::error("cal: invalid date")),
    };

    let title = format!("{} {}", first.format("%B"), first.year());
    let padding = CALENDAR_WIDTH.saturating_sub(title.len()) / 2;
    let mut lines = vec![format!("{}{}", " ".repeat(padding), title), "Su Mo Tu We Th Fr Sa".to_string()];

    let offset = first.weekday().num_days_from_sunday() as usize;
    let mut week = "   ".repeat(offset);
    let mut column = offset;
    let mut day = first;

    while day.month() == first.month() {
        week.push_str(&format!("{:>2} ", day.day()));
        column += 1;
        if column == 7 {
            lines.push(week.trim_end().to_string());
            week.clear();
            column = 0;
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    if !week.is_empty() {
        lines.push(week.trim_end().to_string());
    }

    Ok(SimulatedOutput::ok(lines.join("\n")))
}

pub(super) fn base64(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let decode = args.iter().any(|arg| arg == "-d" || arg == "--decode");
    let text = args
        .iter()
        .rev()
        .find(|arg| *arg != "-d" && *arg != "--decode")
        .map(String::as_str)
        .unwrap_or("");

    if !decode {
        return Ok(SimulatedOutput::ok(STANDARD.encode(text.as_bytes())));
    }

    match STANDARD.decode(text.as_bytes()) {
        Ok(bytes) => Ok(SimulatedOutput::ok(String::from_utf8_lossy(&bytes).into_owned())),
        Err(_) => Ok(SimulatedOutput::error("base64: invalid input")),
    }
}

/// The last fifty entries, numbered by their position in the full history.
pub(super) fn history(sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    let skip = sim.history_len().saturating_sub(HISTORY_WINDOW);
    let lines: Vec<String> = sim
        .history()
        .enumerate()
        .skip(skip)
        .map(|(index, command)| format!("  {}  {}", index + 1, command))
        .collect();

    Ok(SimulatedOutput::ok(lines.join("\n")))
}

pub(super) fn clear(_sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(CLEAR_SCREEN))
}

use std::collections::BTreeSet;

use super::{CommandFault, HandlerResult};
use crate::sandbox::{EnvironmentSimulator, HostProfile, SimulatedOutput};

const NMAP_VERSION: &str = "7.94";
const RESOLVED_ADDRESS: &str = "192.168.1.100";
const DNS_SERVER: &str = "8.8.8.8";

const CURL_BODY: &str = "<!DOCTYPE html>
<html>
<head><title>Target Web Server</title></head>
<body>
<h1>Welcome to the Target Server</h1>
<p>This is a simulated web page for training purposes.</p>
<!-- TODO: Remove debug info before production -->
<!-- Admin panel: /admin -->
</body>
</html>";

const NETSTAT_TABLE: &str = "Active Internet connections (servers and established)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 0.0.0.0:22              0.0.0.0:*               LISTEN
tcp        0      0 0.0.0.0:80              0.0.0.0:*               LISTEN
tcp        0      0 192.168.1.10:45678      192.168.1.100:80        ESTABLISHED";

/// Operands of a network tool, skipping flags. Flags named in
/// `with_value` consume the following argument.
fn operands<'a>(args: &'a [String], with_value: &[&str]) -> Vec<&'a str> {
    let mut operands = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if with_value.contains(&arg.as_str()) {
            iter.next();
        } else if arg.len() > 1 && arg.starts_with('-') {
            continue;
        } else {
            operands.push(arg.as_str());
        }
    }
    operands
}

/// Parses `22,80,8000-8010` into a set of ports.
fn parse_port_spec(spec: &str) -> Option<BTreeSet<u32>> {
    let mut ports = BTreeSet::new();
    for part in spec.split(',').filter(|part| !part.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.parse().ok()?;
                let end: u32 = end.parse().ok()?;
                if start > end || end > u32::from(u16::MAX) {
                    return None;
                }
                ports.extend(start..=end);
            }
            None => {
                ports.insert(part.parse().ok()?);
            }
        }
    }
    if ports.is_empty() {
        None
    } else {
        Some(ports)
    }
}

/// Deterministic scan report of the configured network model. Unknown
/// targets answer with the default three-port profile.
pub(super) fn nmap(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let mut port_filter = None;
    let mut targets = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let spec = if arg == "-p" {
            match iter.next() {
                Some(spec) => Some(spec.as_str()),
                None => return Ok(SimulatedOutput::error("nmap: option requires an argument -- 'p'")),
            }
        } else if let Some(spec) = arg.strip_prefix("-p").filter(|spec| !spec.is_empty()) {
            Some(spec)
        } else {
            None
        };

        if let Some(spec) = spec {
            match parse_port_spec(spec) {
                Some(ports) => port_filter = Some(ports),
                None => {
                    return Ok(SimulatedOutput::error(format!(
                        "nmap: invalid port specification '{}'",
                        spec
                    )));
                }
            }
        } else if !(arg.len() > 1 && arg.starts_with('-')) {
            targets.push(arg.as_str());
        }
    }

    let target = match targets.last() {
        Some(target) => *target,
        None => return Ok(SimulatedOutput::error("Usage: nmap [options] target")),
    };

    let fallback = HostProfile::default_scan();
    let profile = sim.network().hosts.get(target).unwrap_or(&fallback);

    let mut open_ports = Vec::new();
    for (port, info) in profile.sorted_ports() {
        let number: u32 = port.parse().map_err(|_| {
            CommandFault::MalformedEnvironment(format!("host {} has non-numeric port '{}'", target, port))
        })?;
        if port_filter.as_ref().map_or(true, |filter| filter.contains(&number)) {
            let line = format!("{:<10}{:<9}{:<12}{}", format!("{}/tcp", port), "open", info.service, info.banner);
            open_ports.push(line.trim_end().to_string());
        }
    }

    let mut lines = vec![
        format!(
            "Starting Nmap {} ( https://nmap.org ) at {} UTC",
            NMAP_VERSION,
            sim.now().format("%Y-%m-%d %H:%M")
        ),
        format!("Nmap scan report for {}", target),
        "Host is up (0.0015s latency).".to_string(),
        String::new(),
    ];

    if open_ports.is_empty() {
        lines.push("All 1000 scanned ports on this host are in ignored states.".to_string());
    } else {
        lines.push(format!("{:<10}{:<9}{:<12}{}", "PORT", "STATE", "SERVICE", "VERSION"));
        lines.extend(open_ports);
    }

    lines.push(String::new());
    lines.push("Nmap done: 1 IP address (1 host up) scanned in 2.45 seconds".to_string());

    Ok(SimulatedOutput::ok(lines.join("\n")))
}

pub(super) fn ping(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let target = match operands(args, &["-c", "-i", "-W"]).last() {
        Some(target) => target.to_string(),
        None => return Ok(SimulatedOutput::error("Usage: ping target")),
    };

    let output = format!(
        "PING {t} 56(84) bytes of data.\n\
         64 bytes from {t}: icmp_seq=1 ttl=64 time=0.5 ms\n\
         64 bytes from {t}: icmp_seq=2 ttl=64 time=0.4 ms\n\
         64 bytes from {t}: icmp_seq=3 ttl=64 time=0.5 ms\n\
         \n\
         --- {t} ping statistics ---\n\
         3 packets transmitted, 3 received, 0% packet loss, time 2001ms\n\
         rtt min/avg/max/mdev = 0.4/0.47/0.5/0.04 ms",
        t = target
    );
    Ok(SimulatedOutput::ok(output))
}

pub(super) fn traceroute(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let target = match operands(args, &["-m", "-p"]).last() {
        Some(target) => target.to_string(),
        None => return Ok(SimulatedOutput::error("Usage: traceroute target")),
    };

    let output = format!(
        "traceroute to {t}, 30 hops max, 60 byte packets\n \
         1  gateway (192.168.1.1)  0.5 ms  0.4 ms  0.3 ms\n \
         2  10.0.0.1  1.2 ms  1.1 ms  1.0 ms\n \
         3  {t}  2.5 ms  2.4 ms  2.3 ms",
        t = target
    );
    Ok(SimulatedOutput::ok(output))
}

pub(super) fn netstat(_sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(NETSTAT_TABLE))
}

pub(super) fn curl(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    if operands(args, &["-o", "-H", "-X", "-d", "-A"]).is_empty() {
        return Ok(SimulatedOutput::error("curl: no URL specified"));
    }
    Ok(SimulatedOutput::ok(CURL_BODY))
}

pub(super) fn wget(sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let url = match operands(args, &["-O", "-o"]).last() {
        Some(url) => url.to_string(),
        None => return Ok(SimulatedOutput::error("wget: missing URL")),
    };

    let stamp = sim.now().format("%Y-%m-%d %H:%M:%S");
    let output = format!(
        "--{stamp}--  {url}\n\
         Resolving target... {addr}\n\
         Connecting to target|{addr}|:80... connected.\n\
         HTTP request sent, awaiting response... 200 OK\n\
         Length: 1234 (1.2K) [text/html]\n\
         Saving to: 'index.html'\n\
         \n\
         index.html          100%[===================>]   1.2K  --.-KB/s    in 0s\n\
         \n\
         {stamp} (50.0 MB/s) - 'index.html' saved [1234/1234]",
        stamp = stamp,
        url = url,
        addr = RESOLVED_ADDRESS
    );
    Ok(SimulatedOutput::ok(output))
}

pub(super) fn ssh(_sim: &mut EnvironmentSimulator, _args: &[String]) -> HandlerResult {
    Ok(SimulatedOutput::ok(
        "ssh: Simulated connection - interactive SSH is not available in this lab",
    ))
}

pub(super) fn nc(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let operands = operands(args, &["-w"]);
    match operands.as_slice() {
        [host, port, ..] => Ok(SimulatedOutput::ok(format!(
            "Connection to {} {} port [tcp/*] succeeded!",
            host, port
        ))),
        _ => Ok(SimulatedOutput::error("Usage: nc host port")),
    }
}

pub(super) fn nslookup(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let host = match operands(args, &[]).first() {
        Some(host) => host.to_string(),
        None => return Ok(SimulatedOutput::error("Usage: nslookup hostname")),
    };

    let output = format!(
        "Server:\t\t{dns}\n\
         Address:\t{dns}#53\n\
         \n\
         Non-authoritative answer:\n\
         Name:\t{host}\n\
         Address: {addr}",
        dns = DNS_SERVER,
        host = host,
        addr = RESOLVED_ADDRESS
    );
    Ok(SimulatedOutput::ok(output))
}

pub(super) fn dig(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let host = match operands(args, &[]).first() {
        Some(host) => host.to_string(),
        None => return Ok(SimulatedOutput::error("Usage: dig hostname")),
    };

    let output = format!(
        "; <<>> DiG 9.18.1 <<>> {host}\n\
         ;; ANSWER SECTION:\n\
         {host}.\t\t300\tIN\tA\t{addr}\n\
         \n\
         ;; Query time: 10 msec\n\
         ;; SERVER: {dns}#53({dns})",
        host = host,
        addr = RESOLVED_ADDRESS,
        dns = DNS_SERVER
    );
    Ok(SimulatedOutput::ok(output))
}

pub(super) fn whois(_sim: &mut EnvironmentSimulator, args: &[String]) -> HandlerResult {
    let domain = match operands(args, &[]).first() {
        Some(domain) => domain.to_uppercase(),
        None => return Ok(SimulatedOutput::error("Usage: whois domain")),
    };

    let output = format!(
        "Domain Name: {}\n\
         Registry Domain ID: 123456789\n\
         Registrar: Example Registrar, Inc.\n\
         Created Date: 2020-01-01T00:00:00Z\n\
         Registrant Organization: Example Corp\n\
         Registrant Country: US",
        domain
    );
    Ok(SimulatedOutput::ok(output))
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_USER: &str = "student";
pub const DEFAULT_HOSTNAME: &str = "academy-lab";

/// One entry of the virtual filesystem, keyed by absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    #[serde(rename = "file")]
    File {
        #[serde(default)]
        content: String,
    },
    #[serde(rename = "dir", alias = "directory")]
    Directory {
        #[serde(default)]
        children: Vec<String>,
    },
}

impl Node {
    pub fn file(content: impl Into<String>) -> Self {
        Node::File { content: content.into() }
    }

    pub fn dir<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Node::Directory {
            children: children.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Directory { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default)]
    pub banner: String,
}

fn default_service() -> String {
    "unknown".to_string()
}

impl PortInfo {
    pub fn new(service: impl Into<String>, banner: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            banner: banner.into(),
        }
    }
}

/// Scan profile of one simulated host. Port keys are strings in the
/// stored JSON; consumers sort them numerically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProfile {
    #[serde(default)]
    pub ports: BTreeMap<String, PortInfo>,
}

impl HostProfile {
    /// Ports in ascending numeric order; non-numeric keys sort last.
    pub fn sorted_ports(&self) -> Vec<(&str, &PortInfo)> {
        let mut ports: Vec<(&str, &PortInfo)> =
            self.ports.iter().map(|(port, info)| (port.as_str(), info)).collect();
        ports.sort_by_key(|(port, _)| (port.parse::<u32>().unwrap_or(u32::MAX), port.to_string()));
        ports
    }

    pub fn default_scan() -> Self {
        let mut ports = BTreeMap::new();
        ports.insert("22".to_string(), PortInfo::new("ssh", "OpenSSH 8.9"));
        ports.insert("80".to_string(), PortInfo::new("http", "Apache httpd 2.4"));
        ports.insert("443".to_string(), PortInfo::new("https", ""));
        Self { ports }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub hosts: BTreeMap<String, HostProfile>,
}

/// Per-lab description of the simulated machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    #[serde(default)]
    pub filesystem: BTreeMap<String, Node>,
    #[serde(default, alias = "network_config")]
    pub network: NetworkConfig,
    #[serde(default = "default_user")]
    pub simulated_user: String,
    #[serde(default = "default_hostname")]
    pub simulated_hostname: String,
}

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

fn default_hostname() -> String {
    DEFAULT_HOSTNAME.to_string()
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            filesystem: BTreeMap::new(),
            network: NetworkConfig::default(),
            simulated_user: default_user(),
            simulated_hostname: default_hostname(),
        }
    }
}

impl EnvironmentConfig {
    pub fn with_filesystem(mut self, filesystem: BTreeMap<String, Node>) -> Self {
        self.filesystem = filesystem;
        self
    }

    pub fn with_host(mut self, address: impl Into<String>, profile: HostProfile) -> Self {
        self.network.hosts.insert(address.into(), profile);
        self
    }

    pub fn with_identity(mut self, user: impl Into<String>, hostname: impl Into<String>) -> Self {
        self.simulated_user = user.into();
        self.simulated_hostname = hostname.into();
        self
    }

    /// The filesystem the simulator should use: the configured one, or the
    /// built-in training filesystem when none was authored.
    pub fn effective_filesystem(&self) -> BTreeMap<String, Node> {
        if self.filesystem.is_empty() {
            default_filesystem()
        } else {
            self.filesystem.clone()
        }
    }

    /// Children listed by a directory that have no entry of their own.
    pub fn dangling_children(&self) -> Vec<String> {
        let filesystem = self.effective_filesystem();
        let mut dangling = Vec::new();

        for (path, node) in &filesystem {
            if let Node::Directory { children } = node {
                for child in children {
                    let child_path = join_path(path, child);
                    if !filesystem.contains_key(&child_path) {
                        dangling.push(child_path);
                    }
                }
            }
        }

        dangling
    }
}

/// Joins a directory path and an entry name, collapsing `//`.
pub fn join_path(dir: &str, name: &str) -> String {
    format!("{}/{}", dir, name).replace("//", "/")
}

pub fn default_filesystem() -> BTreeMap<String, Node> {
    let entries = [
        ("/", Node::dir(["home", "etc", "var", "tmp"])),
        ("/home", Node::dir(["student"])),
        (
            "/home/student",
            Node::dir(["welcome.txt", "notes.txt", "scan_results", "tools", ".secret.txt", ".bashrc"]),
        ),
        (
            "/home/student/welcome.txt",
            Node::file(
                "Welcome to Terminal Academy!\n\nThis is your first Linux lab environment.\n\
                 Use basic commands to explore and complete the objectives.\n\nGood luck!\n",
            ),
        ),
        (
            "/home/student/notes.txt",
            Node::file(
                "Welcome to Terminal Academy!\n\nYour first task is to explore this system.\n\
                 Hint: Hidden files start with a dot (.)\n",
            ),
        ),
        (
            "/home/student/.secret.txt",
            Node::file(
                "Congratulations! You found the secret file!\n\nFLAG{found_it}\n\n\
                 Well done! You now know how to find hidden files in Linux.\n",
            ),
        ),
        (
            "/home/student/.bashrc",
            Node::file("# .bashrc\n# User specific aliases and functions\nalias ll=\"ls -la\"\n"),
        ),
        ("/home/student/scan_results", Node::dir(["target_192.168.1.100.txt"])),
        (
            "/home/student/scan_results/target_192.168.1.100.txt",
            Node::file(
                "Scan completed at 2024-01-15\nOpen ports: 22, 80, 443, 3306\n\
                 Services: ssh, http, https, mysql\n",
            ),
        ),
        ("/home/student/tools", Node::dir(Vec::<String>::new())),
        ("/etc", Node::dir(["passwd", "hosts"])),
        (
            "/etc/passwd",
            Node::file(
                "root:x:0:0:root:/root:/bin/bash\nstudent:x:1000:1000:Student:/home/student:/bin/bash\n",
            ),
        ),
        (
            "/etc/hosts",
            Node::file("127.0.0.1    localhost\n192.168.1.100    target\n192.168.1.1    gateway\n"),
        ),
        ("/var", Node::dir(["log"])),
        ("/var/log", Node::dir(["auth.log", "syslog"])),
        (
            "/var/log/auth.log",
            Node::file("Jan 15 10:00:00 academy-lab sshd[1234]: Failed password for admin from 192.168.1.50\n"),
        ),
        ("/tmp", Node::dir(Vec::<String>::new())),
    ];

    entries
        .into_iter()
        .map(|(path, node)| (path.to_string(), node))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_json_shape() {
        let json = r#"{
            "/": {"type": "dir", "children": ["a.txt"]},
            "/a.txt": {"type": "file", "content": "hello"},
            "/b": {"type": "directory"}
        }"#;
        let filesystem: BTreeMap<String, Node> = serde_json::from_str(json).unwrap();
        assert_eq!(filesystem["/"], Node::dir(["a.txt"]));
        assert_eq!(filesystem["/a.txt"], Node::file("hello"));
        assert_eq!(filesystem["/b"], Node::dir(Vec::<String>::new()));
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let json = r#"{"type": "symlink", "target": "/etc"}"#;
        assert!(serde_json::from_str::<Node>(json).is_err());
    }

    #[test]
    fn test_environment_defaults_and_alias() {
        let json = r#"{"network_config": {"hosts": {"10.0.0.5": {"ports": {"8080": {"service": "http-alt"}}}}}}"#;
        let env: EnvironmentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(env.simulated_user, "student");
        assert_eq!(env.simulated_hostname, "academy-lab");
        let port = &env.network.hosts["10.0.0.5"].ports["8080"];
        assert_eq!(port.service, "http-alt");
        assert_eq!(port.banner, "");
    }

    #[test]
    fn test_sorted_ports_numeric() {
        let mut profile = HostProfile::default();
        for (port, service) in [("3306", "mysql"), ("443", "https"), ("22", "ssh"), ("80", "http")] {
            profile.ports.insert(port.to_string(), PortInfo::new(service, ""));
        }
        let order: Vec<&str> = profile.sorted_ports().into_iter().map(|(port, _)| port).collect();
        assert_eq!(order, vec!["22", "80", "443", "3306"]);
    }

    #[test]
    fn test_default_filesystem_is_consistent() {
        let env = EnvironmentConfig::default();
        // auth.log's sibling `syslog` is listed but never authored.
        assert_eq!(env.dangling_children(), vec!["/var/log/syslog".to_string()]);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "etc"), "/etc");
        assert_eq!(join_path("/home/student", "notes.txt"), "/home/student/notes.txt");
    }
}

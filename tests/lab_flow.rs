use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use termlab::client::LabClient;
use termlab::config::{Config, LabCatalog};
use termlab::lab::{demo_lab, LabDefinition, Objective};
use termlab::protocol::LabError;
use termlab::sandbox::{EnvironmentConfig, HostProfile, PortInfo};
use termlab::security::AuditLogger;
use termlab::server::{Connection, LabService, RewardSink};
use tokio::net::TcpListener;

const INTRO: &str = "intro-linux";
const RECON: &str = "recon-101";

#[derive(Default)]
struct Ledger {
    awards: Mutex<Vec<(String, u32)>>,
}

impl RewardSink for Ledger {
    fn award(&self, user_id: &str, amount: u32, _reason: &str) {
        self.awards.lock().unwrap().push((user_id.to_string(), amount));
    }
}

fn recon_lab() -> LabDefinition {
    let mut ports = BTreeMap::new();
    ports.insert("3306".to_string(), PortInfo::new("mysql", "MySQL 8.0"));
    ports.insert("443".to_string(), PortInfo::new("https", ""));
    ports.insert("22".to_string(), PortInfo::new("ssh", "OpenSSH 8.9"));
    ports.insert("80".to_string(), PortInfo::new("http", ""));

    LabDefinition::new(RECON, "Reconnaissance")
        .with_objectives(vec![Objective::command("nmap"), Objective::flag()])
        .with_hints(["Scan 192.168.1.100."])
        .with_flags(["FLAG{found_it}"])
        .with_environment(EnvironmentConfig::default().with_host("192.168.1.100", HostProfile { ports }))
        .with_xp(40, 25)
}

fn service() -> (Arc<LabService>, Arc<Ledger>) {
    let ledger = Arc::new(Ledger::default());
    let catalog = LabCatalog::from_labs(vec![demo_lab(), recon_lab()]).unwrap();
    let service = LabService::new(&Config::default(), catalog)
        .unwrap()
        .with_audit(AuditLogger::disabled())
        .with_reward_sink(ledger.clone());
    (Arc::new(service), ledger)
}

#[tokio::test]
async fn test_listing_home_directory() {
    let (service, _) = service();
    service.start_lab(INTRO, "7").await.unwrap();

    let outcome = service.execute_command(INTRO, "7", "ls -la").await.unwrap();
    assert!(!outcome.is_error);
    assert_eq!(outcome.prompt, "student@academy-lab:/home/student$ ");

    let names: Vec<&str> = outcome
        .output
        .lines()
        .filter_map(|line| line.split_whitespace().last())
        .collect();
    for expected in [".", "..", "welcome.txt", "notes.txt", "scan_results", "tools", ".secret.txt", ".bashrc"] {
        assert!(names.contains(&expected), "missing {} in {:?}", expected, names);
    }
    assert!(outcome.output.lines().all(|line| line.starts_with('d') || line.starts_with('-')));
}

#[tokio::test]
async fn test_missing_file() {
    let (service, _) = service();
    service.start_lab(INTRO, "7").await.unwrap();

    let outcome = service.execute_command(INTRO, "7", "cat nonexistent.txt").await.unwrap();
    assert!(outcome.is_error);
    assert_eq!(outcome.return_code, 1);
    assert_eq!(outcome.output, "cat: nonexistent.txt: No such file or directory");
}

#[tokio::test]
async fn test_scan_then_flag_objective() {
    let (service, ledger) = service();
    service.start_lab(RECON, "7").await.unwrap();

    // The flag objective waits for the scan.
    let early = service.execute_command(RECON, "7", "cat .secret.txt").await.unwrap();
    assert!(early.objectives_completed.is_empty());

    let scan = service.execute_command(RECON, "7", "nmap 192.168.1.100").await.unwrap();
    let open: Vec<&str> = scan.output.lines().filter(|line| line.contains("open")).collect();
    assert_eq!(open.len(), 4);
    for (line, port) in open.iter().zip(["22/tcp", "80/tcp", "443/tcp", "3306/tcp"]) {
        assert!(line.starts_with(port), "{} should start with {}", line, port);
    }
    assert_eq!(scan.objectives_completed, vec![0]);

    let flag = service.execute_command(RECON, "7", "cat .secret.txt").await.unwrap();
    assert_eq!(flag.objectives_completed, vec![1]);
    assert!(flag.lab_completed);
    assert_eq!(ledger.awards.lock().unwrap().as_slice(), &[("7".to_string(), 40)]);
}

#[tokio::test]
async fn test_path_traversal_never_reaches_simulator() {
    let (service, _) = service();
    service.start_lab(INTRO, "7").await.unwrap();

    let outcome = service.execute_command(INTRO, "7", "ls ../../etc/passwd").await.unwrap();
    assert!(outcome.is_error);
    assert_eq!(outcome.return_code, 1);
    assert!(outcome.output.contains("Path traversal not allowed"));

    let history = service.execute_command(INTRO, "7", "history").await.unwrap();
    assert!(!history.output.contains("../../etc/passwd"));
}

#[tokio::test]
async fn test_flag_submission_pays_once() {
    let (service, ledger) = service();
    service.start_lab(INTRO, "7").await.unwrap();

    let first = service.submit_flag(INTRO, "7", "FLAG{found_it}").await.unwrap();
    assert!(first.correct);
    assert_eq!(first.xp_awarded, 25);

    let attempt = service.attempt(INTRO, "7").await.unwrap();
    assert!(attempt.completed);
    assert!(attempt.xp_awarded);

    let second = service.submit_flag(INTRO, "7", "FLAG{found_it}").await.unwrap();
    assert!(second.correct);
    assert_eq!(second.xp_awarded, 0);
    assert_eq!(ledger.awards.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_objectives_respect_order() {
    let (service, _) = service();
    service.start_lab(INTRO, "7").await.unwrap();

    // Satisfies objectives 2 and 3 textually, but objective 1 is still open.
    service.execute_command(INTRO, "7", "cat notes.txt").await.unwrap();
    service.execute_command(INTRO, "7", "cat .secret.txt").await.unwrap();

    let attempt = service.attempt(INTRO, "7").await.unwrap();
    assert!(attempt.completed_objectives.is_empty());
    assert_eq!(attempt.commands_executed, 2);
}

#[tokio::test]
async fn test_repeated_command_is_idempotent() {
    let (service, _) = service();
    service.start_lab(INTRO, "7").await.unwrap();

    let first = service.execute_command(INTRO, "7", "ls").await.unwrap();
    assert_eq!(first.objectives_completed, vec![0]);

    let again = service.execute_command(INTRO, "7", "ls").await.unwrap();
    assert!(again.objectives_completed.is_empty());

    let attempt = service.attempt(INTRO, "7").await.unwrap();
    assert_eq!(attempt.completed_objectives.len(), 1);
    assert!(!attempt.xp_awarded);
}

#[tokio::test]
async fn test_hints_then_reset() {
    let (service, ledger) = service();
    service.start_lab(INTRO, "7").await.unwrap();

    for _ in 0..3 {
        service.request_hint(INTRO, "7").await.unwrap();
    }
    assert!(matches!(service.request_hint(INTRO, "7").await, Err(LabError::HintsExhausted)));

    service.view_solution(INTRO, "7").await.unwrap();
    service.execute_command(INTRO, "7", "ls").await.unwrap();

    let attempt = service.reset_lab(INTRO, "7").await.unwrap();
    assert!(attempt.completed_objectives.is_empty());
    assert_eq!(attempt.commands_executed, 0);
    assert_eq!(attempt.hints_used, 3);
    assert!(attempt.solution_viewed);

    // Resetting does not restore the full reward.
    let verdict = service.submit_flag(INTRO, "7", "FLAG{found_it}").await.unwrap();
    assert_eq!(verdict.xp_awarded, 12);
    assert_eq!(ledger.awards.lock().unwrap().as_slice(), &[("7".to_string(), 12)]);
}

#[tokio::test]
async fn test_students_are_isolated() {
    let (service, _) = service();
    service.start_lab(INTRO, "alice").await.unwrap();
    service.start_lab(INTRO, "bob").await.unwrap();

    service.execute_command(INTRO, "alice", "cd /etc").await.unwrap();
    let alice = service.execute_command(INTRO, "alice", "pwd").await.unwrap();
    let bob = service.execute_command(INTRO, "bob", "pwd").await.unwrap();

    assert_eq!(alice.output, "/etc");
    assert_eq!(bob.output, "/home/student");
}

#[tokio::test]
async fn test_concurrent_commands_same_student() {
    let (service, _) = service();
    service.start_lab(INTRO, "7").await.unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.execute_command(INTRO, "7", "pwd").await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_ok());
    }
    assert_eq!(service.attempt(INTRO, "7").await.unwrap().commands_executed, 20);
}

#[tokio::test]
async fn test_client_over_tcp() {
    let (service, _) = service();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, peer)) = listener.accept().await {
            let connection = Connection::new(stream, peer.to_string(), Arc::clone(&service), Duration::from_secs(5));
            tokio::spawn(connection.handle());
        }
    });

    let mut client = LabClient::new(addr.to_string(), "7");
    let welcome = client.connect().await.unwrap();
    assert_eq!(welcome.labs.len(), 2);

    let started = client.start_lab(INTRO).await.unwrap();
    assert!(!started.resumed);

    let outcome = client.execute(INTRO, "cat notes.txt").await.unwrap();
    assert!(outcome.output.contains("Hidden files start with a dot"));

    let hint = client.request_hint(INTRO).await.unwrap();
    assert_eq!(hint.hint_number, 1);

    match client.execute("missing-lab", "ls").await {
        Err(LabError::Remote { kind, .. }) => assert_eq!(kind, "lab_not_found"),
        other => panic!("unexpected {:?}", other),
    }

    let verdict = client.submit_flag(INTRO, "FLAG{found_it}").await.unwrap();
    assert!(verdict.correct);

    client.ping().await.unwrap();
    client.disconnect().await.unwrap();
}

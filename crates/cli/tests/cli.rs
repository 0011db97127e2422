use assert_cmd::Command;

fn biblio() -> Command {
    Command::cargo_bin("biblio").unwrap()
}

#[test]
fn help_lists_the_commands() {
    let output = biblio().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for command in ["serve", "login", "books", "borrow", "records", "stats"] {
        assert!(stdout.contains(command), "missing {command} in help");
    }
}

#[test]
fn malformed_ids_are_rejected_by_the_parser() {
    biblio().args(["books", "show", "not-a-uuid"]).assert().failure();
}

#[test]
fn unreachable_servers_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let output = biblio()
        .args(["--api-url", "http://127.0.0.1:9/api", "--timeout-secs", "2"])
        .arg("--credentials")
        .arg(dir.path().join("credentials.json"))
        .arg("stats")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
    assert!(output.stdout.is_empty());
}

#[test]
fn whoami_without_login_says_so() {
    let dir = tempfile::tempdir().unwrap();
    let output = biblio()
        .arg("--credentials")
        .arg(dir.path().join("credentials.json"))
        .arg("whoami")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Not logged in"));
}

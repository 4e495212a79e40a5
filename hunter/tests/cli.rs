//! CLI tests for the hunter binary.
//!
//! Spawns the binary against a file-backed portal in a temp dir and verifies
//! exit codes and the resulting portal state.

use std::fs;
use std::process::{Command, Output};

use hunter::core::types::{OptionId, SlotId};
use hunter::exit_codes;
use hunter::io::file_portal::PortalState;
use hunter::test_support::Fixture;

fn portal(held: &[(&str, &str)], seats: &[(&str, &str, u32)]) -> PortalState {
    let mut state = PortalState::default();
    for (slot, option) in held {
        state.bindings.insert(SlotId::new(*slot), OptionId::new(*option));
    }
    for (slot, option, free) in seats {
        state
            .seats
            .entry(SlotId::new(*slot))
            .or_default()
            .insert(OptionId::new(*option), *free);
    }
    state
}

fn hunter(fixture: &Fixture, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hunter"))
        .current_dir(fixture.path())
        .args(args)
        .output()
        .expect("spawn hunter")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn validate_reports_table_size() {
    let fixture = Fixture::new().expect("fixture");
    fixture
        .write_config("S1 = [\"A\", \"B\"]\nS2 = [\"X\"]")
        .expect("config");

    let output = hunter(&fixture, &["validate"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("2 slots, 3 options"));
}

#[test]
fn duplicate_option_is_invalid() {
    let fixture = Fixture::new().expect("fixture");
    fixture.write_config("S1 = [\"A\", \"A\"]").expect("config");

    let output = hunter(&fixture, &["validate"]);

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("duplicate option"));
}

#[test]
fn missing_config_is_invalid() {
    let fixture = Fixture::new().expect("fixture");
    let output = hunter(&fixture, &["--config", "nope.toml", "validate"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn status_prints_held_option_and_rank() {
    let fixture = Fixture::new().expect("fixture");
    fixture
        .write_config("S1 = [\"A\", \"B\"]\nS2 = [\"X\"]")
        .expect("config");
    fixture
        .write_portal(&portal(&[("S1", "B"), ("S9", "Q")], &[]))
        .expect("portal");

    let output = hunter(&fixture, &["status"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let out = stdout(&output);
    assert!(out.contains("S1\tB\trank 1"), "{out}");
    assert!(out.contains("S2\t-\tunranked"), "{out}");
    assert!(out.contains("S9\tQ\tuntracked"), "{out}");
}

#[test]
fn plan_resolves_without_writing() {
    let fixture = Fixture::new().expect("fixture");
    fixture.write_config("S1 = [\"A\", \"B\"]").expect("config");
    let before = portal(&[("S1", "B")], &[("S1", "A", 1)]);
    fixture.write_portal(&before).expect("portal");

    let output = hunter(&fixture, &["plan"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(stdout(&output).contains("replace B with A in S1"));
    assert_eq!(fixture.read_portal().expect("read portal"), before);
}

#[test]
fn run_upgrades_slot_and_writes_audit_log() {
    let fixture = Fixture::new().expect("fixture");
    fixture.write_config("S1 = [\"A\", \"B\"]").expect("config");
    fixture
        .write_portal(&portal(&[("S1", "B")], &[("S1", "A", 1)]))
        .expect("portal");

    let output = hunter(
        &fixture,
        &["run", "--max-cycles", "2", "--audit-log", "audit.jsonl"],
    );

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let state = fixture.read_portal().expect("read portal");
    assert_eq!(
        state.bindings.get(&SlotId::new("S1")),
        Some(&OptionId::new("A"))
    );
    assert_eq!(state.seats_for(&SlotId::new("S1"), &OptionId::new("B")), 1);

    let audit = fs::read_to_string(fixture.path().join("audit.jsonl")).expect("audit log");
    let writes: Vec<serde_json::Value> = audit
        .lines()
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0]["write"], "drop");
    assert_eq!(writes[1]["write"], "register");
    assert_eq!(writes[1]["outcome"], "ok");
}

#[test]
fn dry_run_leaves_portal_untouched() {
    let fixture = Fixture::new().expect("fixture");
    fixture.write_config("S1 = [\"A\"]").expect("config");
    let before = portal(&[], &[("S1", "A", 1)]);
    fixture.write_portal(&before).expect("portal");

    let output = hunter(&fixture, &["run", "--dry-run", "--max-cycles", "1"]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert_eq!(fixture.read_portal().expect("read portal"), before);
}

#[test]
fn signed_out_portal_is_fatal() {
    let fixture = Fixture::new().expect("fixture");
    fixture.write_config("S1 = [\"A\"]").expect("config");
    let mut state = portal(&[], &[("S1", "A", 1)]);
    state.signed_in = false;
    fixture.write_portal(&state).expect("portal");

    let output = hunter(&fixture, &["run", "--max-cycles", "3"]);

    assert_eq!(output.status.code(), Some(exit_codes::SESSION_LOST));
    assert!(String::from_utf8_lossy(&output.stderr).contains("session lost"));
}

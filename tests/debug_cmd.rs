use assert_cmd::Command;
use predicates::prelude::*;
use std::time::Duration;

fn cargo_bin() -> Command {
    let mut cmd = Command::cargo_bin("bfvm").unwrap();
    cmd.timeout(Duration::from_secs(5))
        .env("BFVM_CONFIG", "/nonexistent/bfvm.toml")
        .env_remove("BFVM_MAX_STEPS")
        .env_remove("BFVM_EOF")
        .env_remove("BFVM_TAPE_SIZE")
        .env_remove("BFVM_DEBUG_MODE")
        .env_remove("BFVM_LOG");
    cmd
}

#[test]
fn empty_script_exits_quietly() {
    cargo_bin()
        .write_stdin("")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn piped_program_without_commands_runs_once() {
    cargo_bin()
        .write_stdin("+++.\n")
        .assert()
        .success()
        .stdout("\u{3}\n")
        .stderr(predicate::str::contains("loaded 4 instructions"));
}

#[test]
fn explicit_debug_subcommand_in_bare_mode() {
    cargo_bin()
        .args(["debug", "--bare"])
        .write_stdin("++\n.\n")
        .assert()
        .success()
        .stdout("\u{2}\n");
}

#[test]
fn stepping_prints_trace_and_state() {
    cargo_bin()
        .args(["debug", "--bare"])
        .write_stdin("+++>+\n:step 2\n:state\n:exit\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("+x3")
                .and(predicate::str::contains("status: running"))
                .and(predicate::str::contains("steps: 2/")),
        );
}

#[test]
fn continue_finishes_a_stepped_run() {
    cargo_bin()
        .args(["debug", "--bare"])
        .write_stdin("+++.>++.\n:step 2\n:continue\n")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("output: \\x03")
                .and(predicate::str::contains("\u{3}\u{2}").not())
                .and(predicate::str::ends_with("\u{2}\n")),
        );
}

#[test]
fn input_command_feeds_comma() {
    cargo_bin()
        .args(["debug", "--bare"])
        .write_stdin(":input hi\\n\n,.,.,.\n:run\n")
        .assert()
        .success()
        .stdout("hi\n\n");
}

#[test]
fn load_error_is_reported_and_script_continues() {
    cargo_bin()
        .args(["debug", "--bare"])
        .write_stdin("[\n:source\n+.\n:run\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("unmatched bracket '['"))
        .stdout(predicate::str::contains("\u{1}"));
}

#[test]
fn unknown_command_is_reported() {
    cargo_bin()
        .args(["debug", "--bare"])
        .write_stdin(":bogus\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("unknown command ':bogus'"));
}

#[test]
fn sample_flag_loads_program() {
    cargo_bin()
        .args(["debug", "--bare", "--sample", "counter"])
        .write_stdin(":run\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("A"));
}

#[test]
fn editor_on_piped_stdin_fails() {
    cargo_bin()
        .args(["debug", "--editor"])
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("TTY"));
}

#[test]
fn env_mode_is_overridden_by_flag() {
    cargo_bin()
        .env("BFVM_DEBUG_MODE", "editor")
        .args(["debug", "--bare"])
        .write_stdin("+++.")
        .assert()
        .success()
        .stdout("\u{3}\n");
}

#[test]
fn watch_needs_a_terminal() {
    cargo_bin()
        .args(["watch", "+."])
        .write_stdin("")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("terminal"));
}

//! Exercises scenario S6 (header corruption aborts the process) as a
//! subprocess, since the behavior under test is a call to
//! `std::process::exit` that would otherwise tear down the whole test
//! binary.

use assert_cmd::Command;

#[test]
fn cookie_mismatch_aborts_with_corruption_exit_code() {
    Command::cargo_bin("corrupt-and-free")
        .unwrap()
        .assert()
        .code(burrow::CORRUPTION_EXIT_CODE);
}

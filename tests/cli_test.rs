// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tests for the fleetrun binary: argument handling and exit codes.
//!
//! None of these reach a remote host.

use std::process::Command;

fn fleetrun() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_fleetrun"));
    // Keep the user's real config file out of the picture
    command.env("HOME", std::env::temp_dir()).env_remove("RUST_LOG");
    command
}

#[test]
fn test_help_lists_subcommands_and_flags() {
    let output = fleetrun().arg("--help").output().unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for expected in ["command", "script", "task", "--nodes", "--concurrency", "--connect-timeout"] {
        assert!(help.contains(expected), "help should mention {expected}");
    }
}

#[test]
fn test_missing_nodes_is_a_usage_error() {
    let output = fleetrun().args(["command", "run", "uptime"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--nodes"));
}

#[test]
fn test_invalid_format_is_a_configuration_error() {
    let output = fleetrun()
        .args(["command", "run", "uptime", "-n", "localhost", "--format", "xml"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported format"));
}

#[test]
fn test_unsupported_escalation_is_a_configuration_error() {
    let output = fleetrun()
        .args(["command", "run", "id", "-n", "localhost", "--sudo", "doas"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr)
        .contains("Only 'sudo' is supported for privilege escalation."));
}

#[test]
fn test_zero_connect_timeout_is_rejected() {
    let output = fleetrun()
        .args(["command", "run", "id", "-n", "localhost", "--connect-timeout", "0"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_missing_config_file_is_reported() {
    let output = fleetrun()
        .args(["command", "run", "id", "-n", "localhost", "--configfile", "/no/such/fleetrun.yaml"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Could not read config file"));
}

#[test]
fn test_fatal_error_in_json_format() {
    let output = fleetrun()
        .args(["command", "run", "   ", "-n", "localhost", "--format", "json"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let document: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(document["_error"]["kind"], "fleetrun/empty-command");
}

#[test]
fn test_unreachable_node_exits_with_two() {
    // Port 1 on loopback refuses connections
    let output = fleetrun()
        .args(["command", "run", "id", "-n", "127.0.0.1:1", "--connect-timeout", "2", "-k"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("Failed on 127.0.0.1:"));
    assert!(stdout.contains("Ran on 1 nodes in"));
}

//! Tests for locate, purge and checksum.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;

#[test]
fn cli_parse_locate() {
    match parse(&["idlefetch", "locate", "model.bin"]) {
        CliCommand::Locate { key } => assert_eq!(key, "model.bin"),
        _ => panic!("expected Locate"),
    }
}

#[test]
fn cli_parse_purge() {
    match parse(&["idlefetch", "purge", "weights"]) {
        CliCommand::Purge { key } => assert_eq!(key, "weights"),
        _ => panic!("expected Purge"),
    }
}

#[test]
fn cli_parse_checksum() {
    match parse(&["idlefetch", "checksum", "/tmp/file.bin"]) {
        CliCommand::Checksum { target, expect } => {
            assert_eq!(target, "/tmp/file.bin");
            assert!(expect.is_none());
        }
        _ => panic!("expected Checksum"),
    }
    match parse(&["idlefetch", "checksum", "weights", "--expect", "ab12"]) {
        CliCommand::Checksum { target, expect } => {
            assert_eq!(target, "weights");
            assert_eq!(expect.as_deref(), Some("ab12"));
        }
        _ => panic!("expected Checksum"),
    }
}

#[test]
fn cli_unknown_subcommand_fails() {
    assert!(Cli::try_parse_from(["idlefetch", "add", "x"]).is_err());
    assert!(Cli::try_parse_from(["idlefetch", "locate"]).is_err());
}

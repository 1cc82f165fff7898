use std::path::PathBuf;

use clap::Parser;
use kyrlex_cli::{Cli, Command};

#[test]
fn test_no_subcommand_means_chat() {
    let cli = Cli::try_parse_from(["kyrlex"]).unwrap();
    assert!(cli.command.is_none());
    assert!(!cli.stream);
    assert!(cli.config.is_none());
}

#[test]
fn test_ask_with_global_flags() {
    let cli = Cli::try_parse_from([
        "kyrlex",
        "ask",
        "Что такое ООО?",
        "--stream",
        "--config",
        "/tmp/kyrlex.toml",
    ])
    .unwrap();

    assert_eq!(
        cli.command,
        Some(Command::Ask {
            question: "Что такое ООО?".to_string()
        })
    );
    assert!(cli.stream);
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/kyrlex.toml")));
}

#[test]
fn test_chat_subcommand() {
    let cli = Cli::try_parse_from(["kyrlex", "--stream", "chat"]).unwrap();
    assert_eq!(cli.command, Some(Command::Chat));
    assert!(cli.stream);
}

#[test]
fn test_ask_requires_question() {
    assert!(Cli::try_parse_from(["kyrlex", "ask"]).is_err());
}

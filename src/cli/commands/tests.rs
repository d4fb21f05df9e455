use super::*;

#[test]
fn test_no_arguments_selects_daemon_mode() {
    let cli = Cli::try_parse_from(["chat-router"]).unwrap();
    assert!(cli.command.is_none());
}

#[test]
fn test_known_command_selects_client_mode() {
    let cli = Cli::try_parse_from(["chat-router", "health"]).unwrap();
    assert!(matches!(cli.command, Some(Commands::Health)));
}

#[test]
fn test_conversations_flags() {
    let cli = Cli::try_parse_from([
        "chat-router",
        "conversations",
        "--platform",
        "telegram",
        "--limit",
        "10",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Conversations { platform, limit }) => {
            assert_eq!(platform.as_deref(), Some("telegram"));
            assert_eq!(limit, Some(10));
        }
        other => panic!("unexpected command: {:?}", other.is_some()),
    }
}

#[test]
fn test_timeline_positionals_and_cursors() {
    let cli = Cli::try_parse_from([
        "chat-router",
        "timeline",
        "telegram",
        "c1",
        "--before",
        "4",
        "--limit",
        "2",
    ])
    .unwrap();
    match cli.command {
        Some(Commands::Timeline {
            platform,
            chat_id,
            after,
            before,
            limit,
        }) => {
            assert_eq!(platform.as_deref(), Some("telegram"));
            assert_eq!(chat_id.as_deref(), Some("c1"));
            assert_eq!(after, None);
            assert_eq!(before, Some(4));
            assert_eq!(limit, Some(2));
        }
        other => panic!("unexpected command: {:?}", other.is_some()),
    }
}

#[test]
fn test_read_body_from_flag() {
    let body = read_body(Some(r#"{"text":"hi"}"#.to_string())).unwrap();
    assert_eq!(body["text"], "hi");
}

#[test]
fn test_read_body_rejects_invalid_json() {
    let err = read_body(Some("{nope".to_string())).unwrap_err();
    assert!(err.to_string().contains("not valid JSON"));
}

use super::*;

#[test]
fn test_short_text_is_single_chunk() {
    assert_eq!(split_message("hello", 4096), vec!["hello"]);
}

#[test]
fn test_empty_text_is_single_empty_chunk() {
    assert_eq!(split_message("", 4096), vec![""]);
}

#[test]
fn test_default_limit_split_lengths() {
    let text = "a".repeat(5000);
    let chunks = split_message(&text, DEFAULT_CHUNK_LIMIT);
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chars().count(), 4096);
    assert_eq!(chunks[1].chars().count(), 904);
}

#[test]
fn test_newline_break_keeps_newline() {
    let chunks = split_message("abcde\nfghijklmnop", 10);
    assert_eq!(chunks, vec!["abcde\n", "fghijklmno", "p"]);
}

#[test]
fn test_newline_at_window_start_falls_back_to_hard_cut() {
    // The only newline inside the second window is at position 0; a newline
    // break there would emit an empty chunk.
    let text = "abcdefghij\nklmnopqrst";
    let chunks = split_message(text, 10);
    assert_eq!(chunks[0], "abcdefghij");
    assert_eq!(chunks.concat(), text);
    assert!(chunks.iter().all(|c| c.chars().count() <= 10));
}

#[test]
fn test_concat_round_trip_with_mixed_content() {
    let text = "line one\nline two that is quite a bit longer\n\nparagraph".repeat(20);
    for limit in [1, 2, 7, 13, 64] {
        let chunks = split_message(&text, limit);
        assert_eq!(chunks.concat(), text, "limit {}", limit);
        assert!(
            chunks.iter().all(|c| c.chars().count() <= limit),
            "limit {}",
            limit
        );
    }
}

#[test]
fn test_non_bmp_characters_never_split() {
    // Each emoji is one code point but four UTF-8 bytes.
    let text = "\u{1F600}".repeat(10);
    let chunks = split_message(&text, 3);
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks.concat(), text);
    for chunk in &chunks {
        assert!(chunk.chars().all(|c| c == '\u{1F600}'));
    }
}

#[test]
fn test_limit_counts_code_points_not_bytes() {
    // 5 two-byte characters fit a limit of 5 even though that is 10 bytes.
    let text = "\u{e9}".repeat(5);
    assert_eq!(split_message(&text, 5), vec![text.clone()]);
}

#[test]
fn test_default_chunk_limit_trait_method() {
    struct Probe;

    #[async_trait]
    impl PlatformSender for Probe {
        fn platform(&self) -> Platform {
            Platform::Web
        }

        async fn send_text(&self, _chat_id: &str, _text: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    assert_eq!(Probe.chunk_limit(), DEFAULT_CHUNK_LIMIT);
}

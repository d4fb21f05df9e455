use super::*;

#[test]
fn test_as_str_round_trips_from_str() {
    for platform in [Platform::Telegram, Platform::Discord, Platform::Web] {
        let parsed: Platform = platform.as_str().parse().unwrap();
        assert_eq!(parsed, platform);
    }
}

#[test]
fn test_from_str_rejects_unknown() {
    let err = "slack".parse::<Platform>().unwrap_err();
    assert_eq!(err, "Unknown platform: slack");
}

#[test]
fn test_serde_lowercase() {
    let json = serde_json::to_string(&Platform::Telegram).unwrap();
    assert_eq!(json, "\"telegram\"");
    let back: Platform = serde_json::from_str("\"discord\"").unwrap();
    assert_eq!(back, Platform::Discord);
}

#[test]
fn test_display_matches_as_str() {
    assert_eq!(Platform::Web.to_string(), "web");
}

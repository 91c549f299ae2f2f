use chrono::{Duration, Utc};

use crate::model::*;

#[test]
fn test_session_creation() {
    let now = Utc::now();
    let session = Session::new(Some("Holiday plans"), "New Chat", now);

    assert_eq!(session.title, "Holiday plans");
    assert_eq!(session.created_at, now);
    assert_eq!(session.last_active_at, now);
    assert!(!session.id.is_empty());
}

#[test]
fn test_session_blank_title_uses_default() {
    let now = Utc::now();
    assert_eq!(Session::new(None, "New Chat", now).title, "New Chat");
    assert_eq!(Session::new(Some("   "), "New Chat", now).title, "New Chat");
    assert_eq!(Session::new(Some(" Trip "), "New Chat", now).title, "Trip");
}

#[test]
fn test_session_ids_are_unique() {
    let now = Utc::now();
    let a = Session::new(None, "x", now);
    let b = Session::new(None, "x", now);
    assert_ne!(a.id, b.id);
}

#[test]
fn test_title_is_capped() {
    let long = "t".repeat(MAX_TITLE_LENGTH + 50);
    let title = resolve_title(Some(&long), "New Chat");
    assert_eq!(title.chars().count(), MAX_TITLE_LENGTH);
}

#[test]
fn test_preview_truncation() {
    assert_eq!(preview("short", 100), "short");
    let long = "a".repeat(150);
    let p = preview(&long, 100);
    assert_eq!(p.len(), 103);
    assert!(p.ends_with("..."));
    assert_eq!(preview(&"b".repeat(100), 100), "b".repeat(100));
}

#[test]
fn test_preview_is_char_safe() {
    // multi-byte characters must not be split
    let text = "Selamat Hari Raya 🎉🎉🎉";
    let p = preview(text, 19);
    assert_eq!(p, "Selamat Hari Raya 🎉...");
}

#[test]
fn test_role_mapping_is_total_and_inverse() {
    for role in [Role::Human, Role::Assistant] {
        let api: ApiRole = role.into();
        assert_eq!(Role::from(api), role);
    }
    for api in [ApiRole::User, ApiRole::Assistant] {
        let role: Role = api.into();
        assert_eq!(ApiRole::from(role), api);
    }
    assert_eq!(ApiRole::from(Role::Human), ApiRole::User);
    assert_eq!(ApiRole::from(Role::Assistant), ApiRole::Assistant);
}

#[test]
fn test_role_serde_labels() {
    assert_eq!(serde_json::to_string(&Role::Human).unwrap(), "\"human\"");
    assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"ai\"");
    assert_eq!(serde_json::to_string(&ApiRole::User).unwrap(), "\"user\"");
    assert_eq!(
        serde_json::to_string(&ApiRole::Assistant).unwrap(),
        "\"assistant\""
    );
}

#[test]
fn test_role_storage_labels_roundtrip() {
    for role in [Role::Human, Role::Assistant] {
        assert_eq!(Role::from_storage_str(role.as_storage_str()), Some(role));
    }
    assert_eq!(Role::from_storage_str("user"), None);
}

#[test]
fn test_role_parse_any() {
    assert_eq!(Role::parse_any("user"), Some(Role::Human));
    assert_eq!(Role::parse_any("Human"), Some(Role::Human));
    assert_eq!(Role::parse_any("assistant"), Some(Role::Assistant));
    assert_eq!(Role::parse_any("ai"), Some(Role::Assistant));
    assert_eq!(Role::parse_any("system"), None);
}

#[test]
fn test_api_role_from_str() {
    assert_eq!("USER".parse::<ApiRole>().unwrap(), ApiRole::User);
    assert!("human".parse::<ApiRole>().is_err());
}

#[test]
fn test_new_message_builder() {
    let payload = serde_json::json!([{ "toolName": "getHolidays" }]);

    let msg = NewMessage::human("Hi")
        .with_id("m1")
        .with_tool_calls(Some(payload.clone()));
    assert_eq!(msg.id, "m1");
    assert_eq!(msg.role, Role::Human);
    assert_eq!(msg.tool_calls, Some(payload));

    for blank in [serde_json::json!([]), serde_json::json!({}), ToolPayload::Null] {
        let msg = NewMessage::assistant("ok").with_tool_calls(Some(blank));
        assert!(msg.tool_calls.is_none());
    }

    let object = serde_json::json!({ "tool": "getHolidays" });
    let msg = NewMessage::assistant("ok").with_tool_calls(Some(object.clone()));
    assert_eq!(msg.tool_calls, Some(object));
}

#[test]
fn test_into_message() {
    let now = Utc::now();
    let msg = NewMessage::assistant("Hello")
        .with_id("m2")
        .into_message("s1", 1, now);
    assert_eq!(msg.session_id, "s1");
    assert_eq!(msg.order_index, 1);
    assert_eq!(msg.created_at, now);
}

#[test]
fn test_sort_messages_by_order_index_then_time() {
    let now = Utc::now();
    let mut messages = vec![
        NewMessage::human("c").into_message("s", 2, now - Duration::seconds(10)),
        NewMessage::human("a").into_message("s", 0, now),
        NewMessage::human("b").into_message("s", 1, now),
    ];
    sort_messages(&mut messages);
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["a", "b", "c"]);
}

#[test]
fn test_summary_from_messages() {
    let now = Utc::now();
    let session = Session::new(Some("Test"), "New Chat", now);
    let messages = vec![
        NewMessage::human("Hi").into_message(&session.id, 0, now),
        NewMessage::assistant("Hello").into_message(&session.id, 1, now),
    ];
    let summary = SessionSummary::from_messages(&session, &messages, 100);
    assert_eq!(summary.message_count, 2);
    assert_eq!(summary.preview.as_deref(), Some("Hello"));
    assert_eq!(summary.last_role, Some(Role::Assistant));

    let empty = SessionSummary::from_messages(&session, &[], 100);
    assert_eq!(empty.message_count, 0);
    assert!(empty.preview.is_none());
}

#[test]
fn test_search_sessions() {
    let now = Utc::now();
    let mut a = SessionSummary::from_messages(&Session::new(Some("Lebaran"), "x", now), &[], 100);
    a.preview = Some("When is Idul Fitri?".into());
    let b = SessionSummary::from_messages(&Session::new(Some("Nyepi"), "x", now), &[], 100);

    let all = vec![a, b];
    assert_eq!(search_sessions(all.clone(), "").len(), 2);
    assert_eq!(search_sessions(all.clone(), "idul")[0].title, "Lebaran");
    assert_eq!(search_sessions(all.clone(), "NYEPI")[0].title, "Nyepi");
    assert!(search_sessions(all, "natal").is_empty());
}

#[test]
fn test_message_serde_camel_case() {
    let now = Utc::now();
    let msg = NewMessage::human("Hi").with_id("m1").into_message("s1", 0, now);
    let json = serde_json::to_value(&msg).unwrap();
    assert_eq!(json["orderIndex"], 0);
    assert_eq!(json["sessionId"], "s1");
    assert_eq!(json["role"], "human");
    assert!(json.get("toolCalls").is_none());
}

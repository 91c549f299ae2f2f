//! Behaviour every storage backend must share, run against SQLite and JSON.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tanya_core::model::*;
use tanya_core::storage::{JsonStorage, SqliteStorage, Storage, StorageBackend};
use tanya_core::transfer;

/// A backend plus the directory to clean up afterwards.
struct Fixture {
    storage: Arc<Storage>,
    dir: Option<PathBuf>,
}

impl Drop for Fixture {
    fn drop(&mut self) {
        if let Some(dir) = &self.dir {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}

fn sqlite() -> Fixture {
    Fixture {
        storage: Arc::new(Storage::Sqlite(SqliteStorage::open_in_memory().unwrap())),
        dir: None,
    }
}

async fn json() -> Fixture {
    let dir = std::env::temp_dir().join(format!("tanya-contract-{}", uuid::Uuid::now_v7()));
    Fixture {
        storage: Arc::new(Storage::Json(JsonStorage::open(&dir).await.unwrap())),
        dir: Some(dir),
    }
}

async fn backends() -> Vec<Fixture> {
    vec![sqlite(), json().await]
}

async fn pause() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

#[tokio::test]
async fn ordered_scenario() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let name = s.backend_name();
        let session = s.create_session(Some("Test")).await.unwrap();
        s.append_message(&session.id, NewMessage::human("Hi").with_id("m1"))
            .await
            .unwrap();
        s.append_message(&session.id, NewMessage::assistant("Hello").with_id("m2"))
            .await
            .unwrap();

        let messages = s.list_messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 2, "{name}");
        assert_eq!(messages[0].id, "m1");
        assert_eq!(messages[0].order_index, 0);
        assert_eq!(messages[0].role, Role::Human);
        assert_eq!(messages[0].content, "Hi");
        assert_eq!(messages[1].id, "m2");
        assert_eq!(messages[1].order_index, 1);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "Hello");

        let summaries = s.list_sessions().await.unwrap();
        assert_eq!(summaries.len(), 1, "{name}");
        assert_eq!(summaries[0].title, "Test");
        assert_eq!(summaries[0].message_count, 2);
        assert!(summaries[0].preview.as_deref().unwrap().contains("Hello"));
        assert_eq!(summaries[0].last_role, Some(Role::Assistant));
    }
}

#[tokio::test]
async fn blank_title_uses_default() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        assert_eq!(s.create_session(None).await.unwrap().title, "New Chat");
        assert_eq!(s.create_session(Some("  ")).await.unwrap().title, "New Chat");
    }
}

#[tokio::test]
async fn append_is_idempotent_by_id() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let name = s.backend_name();
        let session = s.create_session(None).await.unwrap();
        let first = s
            .append_message(&session.id, NewMessage::human("once").with_id("dup"))
            .await
            .unwrap();
        let again = s
            .append_message(&session.id, NewMessage::human("twice").with_id("dup"))
            .await
            .unwrap();
        assert_eq!(first, again, "{name}");
        assert_eq!(again.content, "once");

        let next = s
            .append_message(&session.id, NewMessage::assistant("next"))
            .await
            .unwrap();
        assert_eq!(next.order_index, 1, "{name}: duplicate must not advance order");
        assert_eq!(s.list_messages(&session.id).await.unwrap().len(), 2);
    }
}

#[tokio::test]
async fn same_message_id_in_two_sessions() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let a = s.create_session(None).await.unwrap();
        let b = s.create_session(None).await.unwrap();
        s.append_message(&a.id, NewMessage::human("a").with_id("shared"))
            .await
            .unwrap();
        let in_b = s
            .append_message(&b.id, NewMessage::human("b").with_id("shared"))
            .await
            .unwrap();
        assert_eq!(in_b.session_id, b.id);
        assert_eq!(in_b.content, "b");
    }
}

#[tokio::test]
async fn missing_session_is_not_found() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let name = s.backend_name();
        assert!(s.get_session("nope").await.unwrap_err().is_not_found(), "{name}");
        assert!(s.list_messages("nope").await.unwrap_err().is_not_found());
        assert!(s.rename_session("nope", "x").await.unwrap_err().is_not_found());
        assert!(s.touch_session("nope").await.unwrap_err().is_not_found());
        assert!(s.delete_session("nope").await.unwrap_err().is_not_found());
        assert!(s
            .append_message("nope", NewMessage::human("x"))
            .await
            .unwrap_err()
            .is_not_found());
    }
}

#[tokio::test]
async fn delete_cascades_to_messages() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let name = s.backend_name();
        let doomed = s.create_session(Some("doomed")).await.unwrap();
        let kept = s.create_session(Some("kept")).await.unwrap();
        for i in 0..3 {
            s.append_message(&doomed.id, NewMessage::human(format!("d{i}")))
                .await
                .unwrap();
        }
        s.append_message(&kept.id, NewMessage::human("k"))
            .await
            .unwrap();

        s.delete_session(&doomed.id).await.unwrap();

        assert!(s.list_messages(&doomed.id).await.unwrap_err().is_not_found(), "{name}");
        assert!(s.get_session(&doomed.id).await.unwrap_err().is_not_found());
        assert!(s.delete_session(&doomed.id).await.unwrap_err().is_not_found());

        let summaries = s.list_sessions().await.unwrap();
        assert_eq!(summaries.len(), 1, "{name}");
        assert_eq!(summaries[0].id, kept.id);
        assert_eq!(s.list_messages(&kept.id).await.unwrap().len(), 1);

        if let Some(dir) = &fx.dir {
            let file = dir.join("conversations").join(format!("{}.json", doomed.id));
            assert!(!file.exists());
        }
    }
}

#[tokio::test]
async fn listing_follows_recency() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let name = s.backend_name();
        let oldest = s.create_session(Some("oldest")).await.unwrap();
        pause().await;
        let middle = s.create_session(Some("middle")).await.unwrap();
        pause().await;
        let newest = s.create_session(Some("newest")).await.unwrap();

        let ids: Vec<String> = s.list_sessions().await.unwrap().into_iter().map(|x| x.id).collect();
        assert_eq!(ids, vec![newest.id.clone(), middle.id.clone(), oldest.id.clone()], "{name}");

        pause().await;
        s.append_message(&oldest.id, NewMessage::human("bump"))
            .await
            .unwrap();
        let ids: Vec<String> = s.list_sessions().await.unwrap().into_iter().map(|x| x.id).collect();
        assert_eq!(ids[0], oldest.id, "{name}: append moves session to the front");

        pause().await;
        s.rename_session(&middle.id, "renamed").await.unwrap();
        let first = &s.list_sessions().await.unwrap()[0];
        assert_eq!(first.id, middle.id, "{name}: rename touches");
        assert_eq!(first.title, "renamed");

        pause().await;
        s.touch_session(&newest.id).await.unwrap();
        assert_eq!(s.list_sessions().await.unwrap()[0].id, newest.id, "{name}");
    }
}

#[tokio::test]
async fn activity_never_behind_newest_message() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let session = s.create_session(None).await.unwrap();
        let m = s
            .append_message(&session.id, NewMessage::human("x"))
            .await
            .unwrap();
        let reloaded = s.get_session(&session.id).await.unwrap();
        assert!(reloaded.last_active_at >= m.created_at);
        assert_eq!(reloaded.created_at, session.created_at);
    }
}

#[tokio::test]
async fn preview_is_truncated() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let session = s.create_session(None).await.unwrap();
        let long = "é".repeat(150);
        s.append_message(&session.id, NewMessage::assistant(long))
            .await
            .unwrap();
        let summary = &s.list_sessions().await.unwrap()[0];
        let preview = summary.preview.as_deref().unwrap();
        assert_eq!(preview.chars().count(), 103, "{}", s.backend_name());
        assert!(preview.ends_with("..."));
    }
}

#[tokio::test]
async fn tool_calls_round_trip() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let session = s.create_session(None).await.unwrap();
        let payload = serde_json::json!([
            { "toolName": "getHolidays", "args": { "month": 3 } },
            { "toolName": "getHolidaysByMonth", "args": { "month": 3 } }
        ]);
        s.append_message(
            &session.id,
            NewMessage::assistant("calling").with_tool_calls(Some(payload.clone())),
        )
        .await
        .unwrap();
        let stored = s.list_messages(&session.id).await.unwrap();
        assert_eq!(stored[0].tool_calls.as_ref(), Some(&payload), "{}", s.backend_name());
    }
}

#[tokio::test]
async fn export_then_import_into_empty_store() {
    for source in backends().await {
        let s = source.storage.as_ref();
        let a = s.create_session(Some("A")).await.unwrap();
        s.append_message(&a.id, NewMessage::human("q")).await.unwrap();
        s.append_message(&a.id, NewMessage::assistant("r")).await.unwrap();
        pause().await;
        let b = s.create_session(Some("B")).await.unwrap();
        s.append_message(&b.id, NewMessage::human("only")).await.unwrap();

        let bundle = transfer::export_all(s).await.unwrap();
        let payload = serde_json::to_value(&bundle).unwrap();

        for target in backends().await {
            let t = target.storage.as_ref();
            let report = transfer::import_bundle(t, &payload, "Imported Chat")
                .await
                .unwrap();
            assert!(report.errors.is_empty());
            assert_eq!(report.imported, 2);
            assert_eq!(report.messages, 3);

            let imported = transfer::export_all(t).await.unwrap();
            assert_eq!(imported.conversations.len(), bundle.conversations.len());
            for (before, after) in bundle.conversations.iter().zip(&imported.conversations) {
                assert_eq!(before.title, after.title);
                assert_ne!(before.id, after.id, "import allocates fresh ids");
                let shape = |c: &transfer::ExportedConversation| {
                    c.messages
                        .iter()
                        .map(|m| (m.role, m.content.clone()))
                        .collect::<Vec<_>>()
                };
                assert_eq!(
                    shape(before),
                    shape(after),
                    "{} -> {}",
                    s.backend_name(),
                    t.backend_name()
                );
            }

            for summary in t.list_sessions().await.unwrap() {
                let orders: Vec<u32> = t
                    .list_messages(&summary.id)
                    .await
                    .unwrap()
                    .iter()
                    .map(|m| m.order_index)
                    .collect();
                assert_eq!(orders, (0..orders.len() as u32).collect::<Vec<_>>());
            }
        }
    }
}

#[tokio::test]
async fn import_twice_never_collides() {
    for fx in backends().await {
        let s = fx.storage.as_ref();
        let session = s.create_session(Some("dup")).await.unwrap();
        s.append_message(&session.id, NewMessage::human("x")).await.unwrap();
        let payload = serde_json::to_value(transfer::export_all(s).await.unwrap()).unwrap();

        transfer::import_bundle(s, &payload, "Imported Chat").await.unwrap();
        transfer::import_bundle(s, &payload, "Imported Chat").await.unwrap();
        assert_eq!(s.list_sessions().await.unwrap().len(), 3);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_get_contiguous_order() {
    for fx in backends().await {
        let storage = Arc::clone(&fx.storage);
        let session = storage.create_session(Some("race")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..50 {
            let storage = Arc::clone(&storage);
            let id = session.id.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .append_message(&id, NewMessage::human(format!("msg {i}")))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let messages = storage.list_messages(&session.id).await.unwrap();
        let orders: Vec<u32> = messages.iter().map(|m| m.order_index).collect();
        assert_eq!(orders, (0..50).collect::<Vec<u32>>(), "{}", storage.backend_name());
        let contents: HashSet<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents.len(), 50);

        let summary = &storage.list_sessions().await.unwrap()[0];
        assert_eq!(summary.message_count, 50);
    }
}

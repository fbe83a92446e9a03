//! Integration tests for the session store.
//!
//! These exercise concurrent appends, channel isolation and recall the way
//! the orchestrator drives them.

use std::sync::Arc;

use withyou_common::MessageRole;
use withyou_memory::{MemoryConfig, MemoryRetriever, SessionKey, SessionStore, TurnRecord};

#[tokio::test]
async fn test_concurrent_users_do_not_interleave() {
    let store = Arc::new(SessionStore::default());

    let mut handles = vec![];
    for user in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let key = SessionKey::main(format!("user_{user}"), "conv");
            for turn in 0..10 {
                store
                    .append(&key, TurnRecord::user(format!("t{turn}"), format!("{user}:{turn}")))
                    .await;
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert_eq!(store.session_count().await, 8);
    for user in 0..8 {
        let transcript = store.transcript(&SessionKey::main(format!("user_{user}"), "conv")).await;
        let expected: Vec<String> = (0..10).map(|t| format!("{user}:{t}")).collect();
        let actual: Vec<String> = transcript.into_iter().map(|r| r.content).collect();
        assert_eq!(actual, expected);
    }
}

#[tokio::test]
async fn test_safety_channel_never_recalled() {
    let store = Arc::new(SessionStore::default());
    let safety = SessionKey::safety("u1", "c1");
    store
        .append(&safety, TurnRecord::user("t1", "screening prompt about sleep"))
        .await;

    let retriever = MemoryRetriever::new(store.clone());
    let recalled = retriever
        .recall(&SessionKey::main("u1", "c2"), "sleep", "t2")
        .await;
    assert!(recalled.is_empty());
    assert_eq!(store.len(&safety).await, 1);
}

#[tokio::test]
async fn test_redelivered_turn_keeps_log_unchanged() {
    let store = SessionStore::new(MemoryConfig::default());
    let key = SessionKey::main("u1", "c1");

    for _ in 0..3 {
        store.append(&key, TurnRecord::user("t1", "hello")).await;
        store
            .append(&key, TurnRecord::assistant("t1", "cbt_coach", "hi there"))
            .await;
    }

    let transcript = store.transcript(&key).await;
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, MessageRole::User);
    assert_eq!(transcript[1].role, MessageRole::Assistant);
    assert_eq!(transcript[1].agent.as_deref(), Some("cbt_coach"));
}

#[tokio::test]
async fn test_recall_limit_applies() {
    let store = Arc::new(SessionStore::new(MemoryConfig {
        recall_limit: 2,
        ..Default::default()
    }));
    let key = SessionKey::main("u1", "c1");
    for i in 0..5 {
        store
            .append(&key, TurnRecord::user(format!("t{i}"), format!("anxious about exams {i}")))
            .await;
    }

    let recalled = MemoryRetriever::new(store)
        .recall(&key, "still anxious about exams", "t9")
        .await;
    assert_eq!(recalled.len(), 2);
}

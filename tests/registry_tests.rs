// ABOUTME: Tests for the ConversationRegistry core invariants.
// ABOUTME: One session per key, exactly-once handshakes, and full drain on close_all.

use hearsay::registry::{ConversationKey, ConversationRegistry, SessionFactory};
use hearsay_agent::backends::mock::MockBackend;
use hearsay_agent::handle::{AgentHandle, Command};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Factory that counts how many sessions it builds, backed by the mock backend
fn counting_mock_factory(created: Arc<AtomicUsize>) -> SessionFactory {
    Box::new(move || {
        created.fetch_add(1, Ordering::SeqCst);
        Ok(MockBackend::new().into_handle())
    })
}

/// Handle whose worker records close invocations, optionally failing them
fn closing_handle(closes: Arc<AtomicUsize>, fail_close: bool) -> AgentHandle {
    let (tx, mut rx) = mpsc::channel::<Command>(8);
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Connect { reply } => {
                    let _ = reply.send(Ok(()));
                }
                Command::Query { reply, .. } => {
                    let _ = reply.send(Ok(()));
                }
                Command::Close { reply } => {
                    closes.fetch_add(1, Ordering::SeqCst);
                    let result = if fail_close {
                        Err(anyhow::anyhow!("close failed"))
                    } else {
                        Ok(())
                    };
                    let _ = reply.send(result);
                }
            }
        }
    });
    AgentHandle::new(tx, "test")
}

#[tokio::test]
async fn test_same_key_reuses_session() {
    let created = Arc::new(AtomicUsize::new(0));
    let registry = ConversationRegistry::new(counting_mock_factory(Arc::clone(&created)));

    let key = ConversationKey::from_event("C1", Some("111.222"), "333.444");
    registry.get_or_create(&key).await.unwrap();
    registry.get_or_create(&key).await.unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(registry.conversation_count().await, 1);
}

#[tokio::test]
async fn test_distinct_keys_get_distinct_sessions() {
    let created = Arc::new(AtomicUsize::new(0));
    let registry = ConversationRegistry::new(counting_mock_factory(Arc::clone(&created)));

    let in_thread = ConversationKey::from_event("C1", Some("1.0"), "2.0");
    let other_thread = ConversationKey::from_event("C1", Some("9.0"), "2.0");
    let other_channel = ConversationKey::from_event("C2", Some("1.0"), "2.0");

    registry.get_or_create(&in_thread).await.unwrap();
    registry.get_or_create(&other_thread).await.unwrap();
    registry.get_or_create(&other_channel).await.unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 3);
    assert_eq!(registry.conversation_count().await, 3);
}

#[tokio::test]
async fn test_threadless_event_keys_to_its_own_ts() {
    let created = Arc::new(AtomicUsize::new(0));
    let registry = ConversationRegistry::new(counting_mock_factory(Arc::clone(&created)));

    // First mention starts a thread; follow-ups carry its ts as thread_ts
    let first = ConversationKey::from_event("C1", None, "100.000");
    let followup = ConversationKey::from_event("C1", Some("100.000"), "200.000");

    registry.get_or_create(&first).await.unwrap();
    registry.get_or_create(&followup).await.unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handshake_failure_leaves_no_entry() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = Arc::clone(&attempts);
    let registry = ConversationRegistry::new(Box::new(move || {
        attempts_clone.fetch_add(1, Ordering::SeqCst);
        Ok(MockBackend::new().fail_connect("no backend").into_handle())
    }));

    let key = ConversationKey::from_event("C1", None, "1.0");

    let result = registry.get_or_create(&key).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("Handshake failed"));
    assert_eq!(registry.conversation_count().await, 0);

    // The next mention retries the handshake from scratch
    let result = registry.get_or_create(&key).await;
    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(registry.conversation_count().await, 0);
}

#[tokio::test]
async fn test_concurrent_get_or_create_single_handshake() {
    let created = Arc::new(AtomicUsize::new(0));
    let registry = Arc::new(ConversationRegistry::new(counting_mock_factory(
        Arc::clone(&created),
    )));

    let key = ConversationKey::from_event("C1", Some("7.0"), "8.0");

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            registry.get_or_create(&key).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(registry.conversation_count().await, 1);
}

#[tokio::test]
async fn test_close_all_closes_every_session() {
    let closes = Arc::new(AtomicUsize::new(0));
    let closes_clone = Arc::clone(&closes);
    let registry = ConversationRegistry::new(Box::new(move || {
        Ok(closing_handle(Arc::clone(&closes_clone), false))
    }));

    for i in 0..3 {
        let key = ConversationKey::from_event("C1", None, &format!("{}.0", i));
        registry.get_or_create(&key).await.unwrap();
    }
    assert_eq!(registry.conversation_count().await, 3);

    registry.close_all().await;

    assert_eq!(closes.load(Ordering::SeqCst), 3);
    assert_eq!(registry.conversation_count().await, 0);
}

#[tokio::test]
async fn test_close_all_continues_past_failures() {
    let closes = Arc::new(AtomicUsize::new(0));
    let built = Arc::new(AtomicUsize::new(0));
    let closes_clone = Arc::clone(&closes);
    let built_clone = Arc::clone(&built);
    let registry = ConversationRegistry::new(Box::new(move || {
        // Every other session fails its close
        let fail_close = built_clone.fetch_add(1, Ordering::SeqCst) % 2 == 0;
        Ok(closing_handle(Arc::clone(&closes_clone), fail_close))
    }));

    for i in 0..4 {
        let key = ConversationKey::from_event("C1", None, &format!("{}.0", i));
        registry.get_or_create(&key).await.unwrap();
    }

    registry.close_all().await;

    assert_eq!(closes.load(Ordering::SeqCst), 4);
    assert_eq!(registry.conversation_count().await, 0);
}

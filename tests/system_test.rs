mod common;

use common::*;
use saisei::config::SystemConfig;
use saisei::eval::Value;
use saisei::gateway::{InboundMessage, Marker};
use saisei::system::{System, SystemError};

#[tokio::test]
async fn test_end_to_end_fragment_lifecycle() {
    let gateway = FakeGateway::new();
    let system = started_system(gateway.clone());

    // trusted author posts a fragment
    system
        .handle_event(created(code_message("m1", "alice", "shared.x = 1")))
        .await
        .unwrap();
    settle().await;
    assert_eq!(system.engine().shared_value("x"), Some(Value::Integer(1)));
    assert!(gateway.has_reaction("m1", Marker::Success));

    // the author edits it into a failure
    system
        .handle_event(updated(code_message("m1", "alice", "explode()")))
        .await
        .unwrap();
    settle().await;
    assert!(gateway.has_reaction("m1", Marker::Failure));
    assert!(!gateway.has_reaction("m1", Marker::Success));
    // prior successful side effects persist in the namespace
    assert_eq!(system.engine().shared_value("x"), Some(Value::Integer(1)));

    // a second fragment registers a handler, then is deleted
    system
        .handle_event(created(code_message(
            "m2",
            "bob",
            "on message { reply(\"hi\") }",
        )))
        .await
        .unwrap();
    assert_eq!(system.engine().registry().len().await, 1);

    system.handle_event(deleted("m2")).await.unwrap();
    assert!(system.engine().registry().is_empty().await);
}

#[tokio::test]
async fn test_untrusted_author_never_enters_the_store() {
    let gateway = FakeGateway::new();
    let system = started_system(gateway.clone());

    system
        .handle_event(created(code_message("m1", "mallory", "shared.x = 1")))
        .await
        .unwrap();
    settle().await;

    assert_eq!(system.fragment_count().await, 0);
    assert_eq!(system.engine().shared_value("x"), None);
    assert!(gateway.reactions_of("m1").is_empty());
}

#[tokio::test]
async fn test_own_messages_are_discarded() {
    let gateway = FakeGateway::new();
    let system = started_system(gateway.clone());

    let mut message = code_message("m1", "alice", "shared.x = 1");
    message.is_self = true;
    system.handle_event(created(message)).await.unwrap();

    // identity can also come from config rather than the transport flag
    let message = code_message("m2", "saisei-bot", "shared.y = 2");
    system.handle_event(created(message)).await.unwrap();

    assert_eq!(system.fragment_count().await, 0);
    assert_eq!(system.engine().shared_value("x"), None);
    assert_eq!(system.engine().shared_value("y"), None);
}

#[tokio::test]
async fn test_non_fragment_messages_route_to_handlers() {
    let gateway = FakeGateway::new();
    let system = started_system(gateway.clone());

    system
        .handle_event(created(code_message(
            "m1",
            "alice",
            "on message { if contains(content, \"ping\") { reply(\"pong\") } }",
        )))
        .await
        .unwrap();

    // anyone may talk in other channels, including untrusted authors
    system
        .handle_event(created(plain_message("e1", "carol", "general", "ping")))
        .await
        .unwrap();
    assert_eq!(gateway.sent_to("general"), vec!["pong".to_string()]);

    // an untrusted message in the code channel is routed, not stored
    system
        .handle_event(created(plain_message("e2", "mallory", CODE_CHANNEL, "ping")))
        .await
        .unwrap();
    assert_eq!(gateway.sent_to(CODE_CHANNEL), vec!["pong".to_string()]);
    assert_eq!(system.fragment_count().await, 1);
}

#[tokio::test]
async fn test_update_of_untracked_message_routes_to_handlers() {
    let gateway = FakeGateway::new();
    let system = started_system(gateway.clone());

    system
        .handle_event(created(code_message(
            "m1",
            "alice",
            "on message { shared.last = content }",
        )))
        .await
        .unwrap();

    system
        .handle_event(updated(plain_message("e1", "carol", "general", "edited text")))
        .await
        .unwrap();
    assert_eq!(
        system.engine().shared_value("last"),
        Some(Value::String("edited text".to_string()))
    );
}

#[tokio::test]
async fn test_delete_of_untracked_message_is_ignored() {
    let gateway = FakeGateway::new();
    let system = started_system(gateway.clone());

    system
        .handle_event(created(code_message("m1", "alice", "shared.x = 1")))
        .await
        .unwrap();
    system.handle_event(deleted("unknown")).await.unwrap();
    assert_eq!(system.fragment_count().await, 1);
}

#[tokio::test]
async fn test_backfill_seeds_store_and_refreshes() {
    let gateway = FakeGateway::new();
    gateway.seed_history(
        CODE_CHANNEL,
        vec![
            code_message("m1", "alice", "shared.trace = \"A\""),
            plain_message("m2", "mallory", CODE_CHANNEL, "not code"),
            {
                let mut own = code_message("m3", "saisei-bot", "shared.trace = \"bot\"");
                own.is_self = true;
                own
            },
            code_message("m4", "bob", "shared.trace = shared.trace + \"B\""),
        ],
    );

    let system = started_system(gateway.clone());
    system.bootstrap().await.unwrap();
    settle().await;

    // only trusted, non-self messages were seeded, oldest first
    assert_eq!(system.fragment_count().await, 2);
    assert_eq!(
        system.engine().shared_value("trace"),
        Some(Value::String("AB".to_string()))
    );
    assert!(gateway.has_reaction("m1", Marker::Success));
    assert!(gateway.has_reaction("m4", Marker::Success));
}

#[tokio::test]
async fn test_oversized_history_is_fatal_not_truncated() {
    let gateway = FakeGateway::new();
    let mut config = test_config();
    config.max_fragments = 3;
    let messages: Vec<InboundMessage> = (0..4)
        .map(|i| code_message(&format!("m{}", i), "alice", "shared.x = 1"))
        .collect();
    gateway.seed_history(CODE_CHANNEL, messages);

    let system = System::new(config, gateway).unwrap();
    let err = system.bootstrap().await.unwrap_err();
    assert!(matches!(
        err,
        SystemError::HistoryTooLarge { max: 3, .. }
    ));
}

#[tokio::test]
async fn test_missing_config_is_fatal() {
    let config = SystemConfig::default();
    let err = System::new(config, FakeGateway::new()).unwrap_err();
    assert!(matches!(err, SystemError::Config(_)));
}

#[tokio::test]
async fn test_handler_from_one_fragment_reads_state_from_another() {
    let gateway = FakeGateway::new();
    let system = started_system(gateway.clone());

    system
        .handle_event(created(code_message("m1", "alice", "shared.greeting = \"hello\"")))
        .await
        .unwrap();
    system
        .handle_event(created(code_message(
            "m2",
            "bob",
            "on message { reply(shared.greeting + \" \" + author) }",
        )))
        .await
        .unwrap();

    system
        .handle_event(created(plain_message("e1", "carol", "general", "hi")))
        .await
        .unwrap();
    assert_eq!(gateway.sent_to("general"), vec!["hello carol".to_string()]);
}

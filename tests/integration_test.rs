use async_trait::async_trait;
use ladderbot::*;
use ladderbot::error::TransportError;
use ladderbot::record::{Mode, Phase, UserId};
use ladderbot::store::UserStore;
use ladderbot::telegram::{CallbackEvent, ChatId, Inbound, InboundMessage, OutboundMessage, Payload};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio_test::assert_ok;

const ADMIN: UserId = 6076530076;

/// Transport that records everything the bot sends
#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<(ChatId, OutboundMessage)>>,
    forwarded: Mutex<Vec<(ChatId, Payload)>>,
}

impl Recorder {
    fn last_text(&self, chat: ChatId) -> String {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| *c == chat)
            .map(|(_, m)| m.text.clone())
            .unwrap_or_default()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl telegram::Transport for Recorder {
    async fn send_message(&self, chat_id: ChatId, message: &OutboundMessage) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push((chat_id, message.clone()));
        Ok(())
    }

    async fn forward(&self, target: ChatId, message: &InboundMessage) -> Result<(), TransportError> {
        self.forwarded.lock().unwrap().push((target, message.payload.clone()));
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

fn test_config() -> Arc<config::Config> {
    let mut config = config::Config::default();
    config.admin.id = ADMIN;
    config.admin.username = "support".into();
    Arc::new(config)
}

fn setup() -> (router::Router, Arc<Recorder>, Arc<store::MemoryStore>) {
    let recorder = Arc::new(Recorder::default());
    let store = Arc::new(store::MemoryStore::new());
    let router = router::Router::new(test_config(), store.clone(), recorder.clone());
    (router, recorder, store)
}

fn text(from: UserId, body: &str) -> Inbound {
    Inbound::Message(InboundMessage {
        message_id: 1,
        chat_id: from,
        from: Some(from),
        payload: Payload::Text(body.into()),
    })
}

fn press(from: UserId, data: &str) -> Inbound {
    Inbound::Callback(CallbackEvent {
        id: "cb".into(),
        from,
        chat_id: Some(from),
        data: Some(data.into()),
    })
}

/// Full free-mode session: start, seed period, lose to exhaustion
#[tokio::test]
async fn test_free_session_to_exhaustion() {
    let (router, recorder, store) = setup();

    router.handle(text(1, "/start")).await;
    assert!(recorder.last_text(1).contains("Choose Mode"));
    router.handle(press(1, messages::CB_START_FREE)).await;

    let mut expected_period = 555;
    for step in 1..=6u32 {
        router.handle(text(1, "555")).await;
        expected_period += 1;
        assert!(recorder
            .last_text(1)
            .contains(&format!("Next Period: {expected_period}")));

        router.handle(press(1, messages::CB_RESULT_LOSS)).await;
        let r = store.get(1).await.unwrap().unwrap();
        assert_eq!(r.level, step + 1);
        assert_eq!(r.bet, 1u64 << step);
        assert_eq!(r.period, expected_period);
    }

    router.handle(text(1, "000")).await;
    router.handle(press(1, messages::CB_RESULT_LOSS)).await;
    assert!(recorder.last_text(1).contains("Max 7 Levels Reached"));

    let r = store.get(1).await.unwrap().unwrap();
    assert_eq!((r.level, r.bet, r.period), (1, 1, 0));
    assert!(r.history.is_empty());
    assert_eq!(r.mode, Mode::Free);
    assert_eq!(r.phase, Phase::AwaitingMode);
}

/// A win mid-ladder returns to level 1 and keeps counting periods
#[tokio::test]
async fn test_win_resets_ladder_keeps_period() {
    let (router, recorder, store) = setup();

    router.handle(press(1, messages::CB_START_FREE)).await;
    router.handle(text(1, "555")).await;
    router.handle(press(1, messages::CB_RESULT_LOSS)).await;
    router.handle(text(1, "555")).await;
    router.handle(press(1, messages::CB_RESULT_WIN)).await;
    assert!(recorder.last_text(1).contains("WIN"));

    let r = store.get(1).await.unwrap().unwrap();
    assert_eq!((r.level, r.bet, r.period), (1, 1, 557));
    assert_eq!(r.history.len(), 2);

    router.handle(text(1, "123456")).await;
    assert!(recorder.last_text(1).contains("Next Period: 558"));
}

/// VIP is refused until the admin grants it, then uses the 5-level ladder
#[tokio::test]
async fn test_vip_grant_flow() {
    let (router, recorder, store) = setup();

    router.handle(text(2, "/start")).await;
    router.handle(press(2, messages::CB_START_VIP)).await;
    assert!(recorder.last_text(2).contains("VIP mode is locked"));
    assert_eq!(store.get(2).await.unwrap().unwrap().phase, Phase::AwaitingMode);

    router.handle(text(ADMIN, "/addvip 2")).await;
    assert!(recorder.last_text(ADMIN).contains("User 2 is now VIP"));

    router.handle(press(2, messages::CB_START_VIP)).await;
    assert!(recorder.last_text(2).contains("VIP Mode Started"));

    for _ in 0..5 {
        router.handle(text(2, "800")).await;
        router.handle(press(2, messages::CB_RESULT_LOSS)).await;
    }
    assert!(recorder.last_text(2).contains("Max 5 Levels Reached"));
    let r = store.get(2).await.unwrap().unwrap();
    assert!(r.vip);
    assert_eq!(r.mode, Mode::Vip);
}

/// Unknown users are told to /start and no record appears
#[tokio::test]
async fn test_unknown_user_period() {
    let (router, recorder, store) = setup();

    router.handle(text(3, "555")).await;
    assert_eq!(recorder.last_text(3), "Please type /start first");
    router.handle(press(3, messages::CB_RESULT_WIN)).await;

    assert!(store.get(3).await.unwrap().is_none());
    assert_eq!(recorder.sent_count(), 1);
}

/// Broadcast reaches every user and survives a restart of the store
#[tokio::test]
async fn test_broadcast_mode_persists_across_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("users.json");

    {
        let recorder = Arc::new(Recorder::default());
        let store = Arc::new(assert_ok!(store::JsonFileStore::open(&path)));
        let router = router::Router::new(test_config(), store, recorder);
        router.handle(text(10, "/start")).await;
        router.handle(text(11, "/start")).await;
        router.handle(text(ADMIN, "/broadcast")).await;
    }

    let recorder = Arc::new(Recorder::default());
    let store = Arc::new(assert_ok!(store::JsonFileStore::open(&path)));
    let router = router::Router::new(test_config(), store, recorder.clone());

    router
        .handle(Inbound::Message(InboundMessage {
            message_id: 77,
            chat_id: ADMIN,
            from: Some(ADMIN),
            payload: Payload::Photo {
                file_id: "photo-1".into(),
                caption: Some("new round".into()),
            },
        }))
        .await;
    router.finish_broadcasts().await;

    let forwarded = recorder.forwarded.lock().unwrap().clone();
    assert_eq!(forwarded.len(), 2);
    assert!(forwarded.iter().any(|(t, _)| *t == 10));
    assert!(forwarded.iter().any(|(t, _)| *t == 11));
    assert!(recorder.last_text(ADMIN).contains("Delivered to 2 users"));

    router.handle(text(ADMIN, "/cancelbroadcast")).await;
    router.handle(text(ADMIN, "hello again")).await;
    assert_eq!(recorder.forwarded.lock().unwrap().len(), 2);
}

/// Send mode replaces broadcast mode; commands are never forwarded
#[tokio::test]
async fn test_send_mode_replaces_broadcast() {
    let (router, recorder, store) = setup();
    for id in [20, 21] {
        store.upsert(record::UserRecord::new(id)).await.unwrap();
    }

    router.handle(text(ADMIN, "/broadcast")).await;
    router.handle(text(ADMIN, "/send 21")).await;
    router.handle(text(ADMIN, "just for you")).await;
    router.handle(text(ADMIN, "/cancelsend")).await;

    let forwarded = recorder.forwarded.lock().unwrap().clone();
    assert_eq!(forwarded, vec![(21, Payload::Text("just for you".into()))]);
}

/// Each cancel command only clears its own forwarding mode
#[tokio::test]
async fn test_cancel_commands_only_clear_their_own_mode() {
    let (router, recorder, store) = setup();
    for id in [30, 31] {
        store.upsert(record::UserRecord::new(id)).await.unwrap();
    }

    router.handle(text(ADMIN, "/send 31")).await;
    router.handle(text(ADMIN, "/cancelbroadcast")).await;
    assert!(recorder.last_text(ADMIN).contains("Send mode ON for user 31"));
    router.handle(text(ADMIN, "still private")).await;
    assert_eq!(
        recorder.forwarded.lock().unwrap().clone(),
        vec![(31, Payload::Text("still private".into()))]
    );

    router.handle(text(ADMIN, "/broadcast")).await;
    router.handle(text(ADMIN, "/cancelsend")).await;
    assert!(recorder.last_text(ADMIN).contains("Broadcast mode ON"));
    router.handle(text(ADMIN, "to everyone")).await;
    router.finish_broadcasts().await;
    assert_eq!(recorder.forwarded.lock().unwrap().len(), 3);

    let session = store.admin_session(ADMIN).await.unwrap().unwrap();
    assert_eq!(session.mode, admin::AdminMode::Broadcast);
}

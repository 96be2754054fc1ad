//! End-to-end relay tests with in-memory mail collaborators.

#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use maillist_core::{
    AudienceKey, Engine, FetchError, IncomingMessage, MailFetch, MailSend, Message, Rejection,
    Relay, RelayOutcome, SendError, Snippets, SubscriptionStore, extract_tags,
};
use tempfile::TempDir;

#[derive(Debug, Default)]
struct FakeMailbox {
    batches: VecDeque<Vec<IncomingMessage>>,
}

#[async_trait]
impl MailFetch for FakeMailbox {
    async fn fetch_unseen(&mut self) -> Result<Vec<IncomingMessage>, FetchError> {
        Ok(self.batches.pop_front().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
struct FakeTransport {
    sent: Mutex<Vec<Message>>,
    fail: bool,
}

impl FakeTransport {
    fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailSend for FakeTransport {
    async fn send(&self, message: &Message) -> Result<(), SendError> {
        if self.fail {
            return Err(SendError::Transport("connection refused".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct BrokenMailbox;

#[async_trait]
impl MailFetch for BrokenMailbox {
    async fn fetch_unseen(&mut self) -> Result<Vec<IncomingMessage>, FetchError> {
        Err(FetchError::Mailbox("login failed".to_string()))
    }
}

fn mail(from: &str, subject: &str) -> IncomingMessage {
    IncomingMessage {
        id: format!("{from}:{subject}"),
        subject: subject.to_string(),
        from_address: from.to_string(),
        from_name: from.split('@').next().unwrap().to_string(),
        text: "Hello list".to_string(),
        ..IncomingMessage::default()
    }
}

fn store(dir: &TempDir, members: &[(&str, &str)]) -> SubscriptionStore {
    let mut store = SubscriptionStore::load(dir.path().join("maillist.json")).unwrap();
    for (subject, address) in members {
        store.add(address, extract_tags(subject).as_ref()).unwrap();
    }
    store
}

fn relay(
    store: SubscriptionStore,
    batch: Vec<IncomingMessage>,
) -> Relay<FakeMailbox, FakeTransport> {
    let engine = Engine::new(store, Snippets::new("Test List", "list@example.com"));
    let mailbox = FakeMailbox {
        batches: VecDeque::from([batch]),
    };
    Relay::new(engine, mailbox, FakeTransport::default())
}

#[tokio::test]
async fn test_tagged_post_is_forwarded_to_audience() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(
        &dir,
        &[
            ("#a #b", "x@x"),
            ("#b #a", "t1@x"),
            ("#a #b", "t2@x"),
            ("", "g@x"),
            ("", "t1@x"),
        ],
    );
    let mut relay = relay(store, vec![mail("x@x", "Hello #a #b")]);

    let outcomes = relay.process_mails().await.unwrap();

    assert_eq!(outcomes, vec![RelayOutcome::Forwarded { receivers: 3 }]);
    let sent = relay.sender().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].receivers, vec!["g@x", "t1@x", "t2@x"]);
    assert_eq!(sent[0].sender_name, "x");
    assert!(sent[0].text.starts_with("Hello list"));
    assert!(sent[0].text.contains("$>unsubscribe #a #b"));
}

#[tokio::test]
async fn test_subscribe_command_sends_welcome_only() {
    let dir = tempfile::tempdir().unwrap();
    let mut relay = relay(store(&dir, &[("", "g@x")]), vec![mail("y@x", "$>subscribe #news")]);

    let outcomes = relay.process_mails().await.unwrap();

    assert_eq!(outcomes, vec![RelayOutcome::Command { confirmed: true }]);
    let sent = relay.sender().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].receivers, vec!["y@x"]);
    assert_eq!(sent[0].subject, "Welcome!");
    assert!(sent[0].text.contains("Test List"));

    let news = AudienceKey::parse("news").unwrap();
    assert_eq!(relay.engine().store().list().bucket(&news), ["y@x".to_string()]);

    let reloaded = SubscriptionStore::load(dir.path().join("maillist.json")).unwrap();
    assert!(reloaded.is_subscribed("y@x", extract_tags("#news").as_ref()));
}

#[tokio::test]
async fn test_unsubscribe_command_sends_goodbye() {
    let dir = tempfile::tempdir().unwrap();
    let mut relay = relay(
        store(&dir, &[("", "z@x"), ("", "g@x")]),
        vec![mail("z@x", "$>unsubscribe")],
    );

    let outcomes = relay.process_mails().await.unwrap();

    assert_eq!(outcomes, vec![RelayOutcome::Command { confirmed: true }]);
    let sent = relay.sender().sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].receivers, vec!["z@x"]);
    assert_eq!(sent[0].subject, "Bye!");
    assert!(!relay.engine().store().is_subscribed("z@x", None));
}

#[tokio::test]
async fn test_post_from_non_subscriber_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let mut relay = relay(store(&dir, &[("", "g@x")]), vec![mail("stranger@x", "Plain post")]);

    let outcomes = relay.process_mails().await.unwrap();

    assert_eq!(
        outcomes,
        vec![RelayOutcome::Rejected(Rejection::PolicyViolation {
            sender: "stranger@x".to_string(),
            audience: AudienceKey::global(),
        })]
    );
    assert!(relay.sender().sent().is_empty());
}

#[tokio::test]
async fn test_post_from_sole_subscriber_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let mut relay = relay(store(&dir, &[("#test", "solo@x")]), vec![mail("solo@x", "#test hi")]);

    let outcomes = relay.process_mails().await.unwrap();

    assert_eq!(
        outcomes,
        vec![RelayOutcome::Rejected(Rejection::NoReceivers {
            audience: AudienceKey::parse("test").unwrap(),
        })]
    );
    assert!(relay.sender().sent().is_empty());
}

#[tokio::test]
async fn test_unrecognized_command_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut relay = relay(store(&dir, &[("", "g@x"), ("", "h@x")]), vec![mail("g@x", "$>help")]);

    let outcomes = relay.process_mails().await.unwrap();

    assert_eq!(outcomes, vec![RelayOutcome::Ignored]);
    assert!(relay.sender().sent().is_empty());
}

#[tokio::test]
async fn test_batch_is_processed_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut relay = relay(
        store(&dir, &[("", "g@x")]),
        vec![
            mail("n@x", "$>subscribe"),
            mail("n@x", "First post"),
            mail("n@x", "$>unsubscribe"),
            mail("n@x", "Second post"),
        ],
    );

    let outcomes = relay.process_mails().await.unwrap();

    assert_eq!(outcomes[0], RelayOutcome::Command { confirmed: true });
    assert_eq!(outcomes[1], RelayOutcome::Forwarded { receivers: 1 });
    assert_eq!(outcomes[2], RelayOutcome::Command { confirmed: true });
    assert!(matches!(
        outcomes[3],
        RelayOutcome::Rejected(Rejection::PolicyViolation { .. })
    ));

    let sent = relay.sender().sent();
    let subjects: Vec<_> = sent.iter().map(|m| m.subject.as_str()).collect();
    assert_eq!(subjects, vec!["Welcome!", "First post", "Bye!"]);
}

#[tokio::test]
async fn test_empty_mailbox_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut relay = relay(store(&dir, &[("", "g@x")]), Vec::new());

    assert!(relay.process_mails().await.unwrap().is_empty());
    assert!(relay.process_mails().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_send_failure_is_reported_per_message() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(
        store(&dir, &[("", "a@x"), ("", "b@x")]),
        Snippets::new("Test List", "list@example.com"),
    );
    let mailbox = FakeMailbox {
        batches: VecDeque::from([vec![mail("a@x", "Post"), mail("c@x", "$>subscribe")]]),
    };
    let transport = FakeTransport {
        fail: true,
        ..FakeTransport::default()
    };
    let mut relay = Relay::new(engine, mailbox, transport);

    let outcomes = relay.process_mails().await.unwrap();

    assert!(matches!(outcomes[0], RelayOutcome::Failed(_)));
    assert_eq!(outcomes[1], RelayOutcome::Command { confirmed: false });
    assert!(relay.engine().store().is_subscribed("c@x", None));
}

#[tokio::test]
async fn test_fetch_failure_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::new(
        store(&dir, &[]),
        Snippets::new("Test List", "list@example.com"),
    );
    let mut relay = Relay::new(engine, BrokenMailbox, FakeTransport::default());

    let err = relay.process_mails().await.unwrap_err();

    assert!(matches!(err, FetchError::Mailbox(_)));
}

//! Outbound-mail capture and its assertion steps.

use crate::world::TabletopWorld;
use cucumber::gherkin::Step;
use cucumber::{given, then};
use parking_lot::Mutex;
use std::sync::Arc;

/// One captured outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
    pub from: String,
    pub to: Vec<String>,
}

impl EmailMessage {
    /// Field access by column name, for table matching.
    fn field(&self, name: &str) -> Option<String> {
        match name {
            "subject" => Some(self.subject.clone()),
            "body" => Some(self.body.clone()),
            "from" => Some(self.from.clone()),
            "to" => Some(self.to.join(", ")),
            _ => None,
        }
    }
}

/// The captured outbox. The system under test pushes into it; the
/// assertion steps read it. Cleared by the harness between scenarios.
#[derive(Clone, Default)]
pub struct Outbox {
    messages: Arc<Mutex<Vec<EmailMessage>>>,
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("messages", &self.messages.lock().len())
            .finish()
    }
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: EmailMessage) {
        self.messages.lock().push(message);
    }

    pub fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

/// Seeding step for suites exercising the mail assertions without a
/// live application.
#[given(expr = "an email with subject {string} from {string} to {string} has been sent")]
async fn given_email_sent(world: &mut TabletopWorld, subject: String, from: String, to: String) {
    world.env.outbox.push(EmailMessage {
        subject,
        body: String::new(),
        from,
        to: to.split(',').map(|part| part.trim().to_string()).collect(),
    });
}

#[then("I see that no email was sent")]
async fn then_no_email(world: &mut TabletopWorld) {
    let outbox = world.env.outbox.messages();
    assert!(
        outbox.is_empty(),
        "expected an empty outbox, found {} message(s): {outbox:?}",
        outbox.len()
    );
}

#[then("I see that emails were sent with the following parameters:")]
async fn then_emails_sent(world: &mut TabletopWorld, step: &Step) {
    let table = world.table_of(step);
    let outbox = world.env.outbox.messages();
    assert_eq!(
        outbox.len(),
        table.len(),
        "outbox holds {} message(s), the table expects {}",
        outbox.len(),
        table.len()
    );

    for row in table.rows() {
        let expected = row.as_map();
        let matched = outbox.iter().any(|email| {
            expected
                .iter()
                .all(|(field, value)| email.field(field).as_deref() == Some(value.as_str()))
        });
        assert!(matched, "no sent email matches {expected:?}; outbox: {outbox:?}");
    }
}

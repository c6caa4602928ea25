//! In-memory mailbox for accepted messages.
//!
//! Every accepted message is kept under its Message-ID and indexed by sender
//! and by recipient, so tests can ask "what did this address send?" without
//! scraping a spool directory. The store is the only state shared between
//! sessions; all three maps sit behind one lock so an overwrite or removal
//! never leaves a secondary index pointing at a missing record.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

/// A message accepted by the server, immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRecord {
    /// `Message-ID` header value in angle-bracket form, e.g. `<id@host>`.
    pub message_id: String,
    /// Address taken from the `From` header.
    pub sender_email: String,
    /// Addresses taken from the `To` header, in header order.
    pub recipient_emails: Vec<String>,
    /// The CRLF-joined message text (headers and body), without the
    /// terminating dot line.
    pub raw_body: String,
}

#[derive(Debug, Default)]
struct Inner {
    by_id: HashMap<String, EmailRecord>,
    by_sender: HashMap<String, HashSet<String>>,
    by_recipient: HashMap<String, HashSet<String>>,
}

/// Indexed store of accepted messages.
#[derive(Debug, Default)]
pub struct Mailbox {
    inner: RwLock<Inner>,
}

impl Mailbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a record, replacing any prior record with the same message id.
    ///
    /// Replacement unlinks the old record first, so index entries for a
    /// previous sender or recipient set do not linger.
    pub fn set(&self, record: EmailRecord) {
        let mut inner = self.write();

        if inner.by_id.contains_key(&record.message_id) {
            debug!(message_id = %record.message_id, "overwriting stored message");
            unlink(&mut inner, &record.message_id);
        }

        inner
            .by_sender
            .entry(record.sender_email.clone())
            .or_default()
            .insert(record.message_id.clone());

        for recipient in &record.recipient_emails {
            inner
                .by_recipient
                .entry(recipient.clone())
                .or_default()
                .insert(record.message_id.clone());
        }

        inner.by_id.insert(record.message_id.clone(), record);
    }

    /// Look up a record by message id.
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<EmailRecord> {
        self.read().by_id.get(message_id).cloned()
    }

    /// All records whose `From` address is `sender_email`.
    #[must_use]
    pub fn get_by_sender(&self, sender_email: &str) -> Vec<EmailRecord> {
        let inner = self.read();
        resolve(&inner, inner.by_sender.get(sender_email))
    }

    /// All records addressed to `recipient_email`.
    #[must_use]
    pub fn get_by_recipient(&self, recipient_email: &str) -> Vec<EmailRecord> {
        let inner = self.read();
        resolve(&inner, inner.by_recipient.get(recipient_email))
    }

    /// Remove a record and all of its index entries. Removing an absent id
    /// is a no-op.
    pub fn invalidate(&self, message_id: &str) {
        let mut inner = self.write();

        if inner.by_id.contains_key(message_id) {
            debug!(%message_id, "invalidating stored message");
            unlink(&mut inner, message_id);
        }
    }
}

fn resolve(inner: &Inner, ids: Option<&HashSet<String>>) -> Vec<EmailRecord> {
    ids.into_iter()
        .flatten()
        .filter_map(|id| inner.by_id.get(id).cloned())
        .collect()
}

fn unlink(inner: &mut Inner, message_id: &str) {
    let Some(record) = inner.by_id.remove(message_id) else {
        return;
    };

    if let Some(ids) = inner.by_sender.get_mut(&record.sender_email) {
        ids.remove(message_id);
        if ids.is_empty() {
            inner.by_sender.remove(&record.sender_email);
        }
    }

    for recipient in &record.recipient_emails {
        if let Some(ids) = inner.by_recipient.get_mut(recipient) {
            ids.remove(message_id);
            if ids.is_empty() {
                inner.by_recipient.remove(recipient);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{EmailRecord, Mailbox};

    fn record(message_id: &str, sender: &str, recipients: &[&str]) -> EmailRecord {
        EmailRecord {
            message_id: message_id.to_owned(),
            sender_email: sender.to_owned(),
            recipient_emails: recipients.iter().map(|&r| r.to_owned()).collect(),
            raw_body: format!("Subject: test\r\n\r\nbody of {message_id}"),
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let mailbox = Mailbox::new();
        let stored = record("<a@x>", "alice@example.com", &["bob@example.com"]);

        mailbox.set(stored.clone());
        assert_eq!(mailbox.get("<a@x>"), Some(stored));
    }

    #[test]
    fn get_absent_id_is_none() {
        let mailbox = Mailbox::new();
        assert_eq!(mailbox.get("<nope@x>"), None);
    }

    #[test]
    fn indices_cover_sender_and_every_recipient() {
        let mailbox = Mailbox::new();
        mailbox.set(record(
            "<a@x>",
            "alice@example.com",
            &["bob@example.com", "carol@example.com"],
        ));

        assert_eq!(mailbox.get_by_sender("alice@example.com").len(), 1);
        assert_eq!(mailbox.get_by_recipient("bob@example.com").len(), 1);
        assert_eq!(mailbox.get_by_recipient("carol@example.com").len(), 1);
        assert!(mailbox.get_by_recipient("alice@example.com").is_empty());
    }

    #[test]
    fn invalidate_removes_record_and_index_entries() {
        let mailbox = Mailbox::new();
        mailbox.set(record("<a@x>", "alice@example.com", &["bob@example.com"]));

        mailbox.invalidate("<a@x>");

        assert_eq!(mailbox.get("<a@x>"), None);
        assert!(mailbox.get_by_sender("alice@example.com").is_empty());
        assert!(mailbox.get_by_recipient("bob@example.com").is_empty());
    }

    #[test]
    fn invalidate_is_idempotent() {
        let mailbox = Mailbox::new();
        mailbox.invalidate("<never@x>");

        mailbox.set(record("<a@x>", "alice@example.com", &["bob@example.com"]));
        mailbox.invalidate("<a@x>");
        mailbox.invalidate("<a@x>");

        assert_eq!(mailbox.get("<a@x>"), None);
    }

    #[test]
    fn two_records_share_a_sender_bucket() {
        let mailbox = Mailbox::new();
        mailbox.set(record("<a@x>", "alice@example.com", &["bob@example.com"]));
        mailbox.set(record("<b@x>", "alice@example.com", &["carol@example.com"]));

        let mut ids: Vec<String> = mailbox
            .get_by_sender("alice@example.com")
            .into_iter()
            .map(|r| r.message_id)
            .collect();
        ids.sort();
        assert_eq!(ids, ["<a@x>", "<b@x>"]);

        mailbox.invalidate("<a@x>");

        let remaining = mailbox.get_by_sender("alice@example.com");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message_id, "<b@x>");
    }

    #[test]
    fn overwrite_reindexes_instead_of_leaving_stale_entries() {
        let mailbox = Mailbox::new();
        mailbox.set(record("<a@x>", "old@example.com", &["bob@example.com"]));
        mailbox.set(record("<a@x>", "new@example.com", &["carol@example.com"]));

        assert!(mailbox.get_by_sender("old@example.com").is_empty());
        assert!(mailbox.get_by_recipient("bob@example.com").is_empty());
        assert_eq!(mailbox.get_by_sender("new@example.com").len(), 1);
        assert_eq!(mailbox.get_by_recipient("carol@example.com").len(), 1);
        assert_eq!(
            mailbox.get("<a@x>").unwrap().sender_email,
            "new@example.com"
        );
    }

    #[test]
    fn concurrent_writers_keep_indices_consistent() {
        let mailbox = Arc::new(Mailbox::new());

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let mailbox = Arc::clone(&mailbox);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("<{n}-{i}@x>");
                        mailbox.set(record(&id, "alice@example.com", &["bob@example.com"]));
                        if i % 2 == 0 {
                            mailbox.invalidate(&id);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let by_sender = mailbox.get_by_sender("alice@example.com");
        let by_recipient = mailbox.get_by_recipient("bob@example.com");
        assert_eq!(by_sender.len(), 8 * 25);
        assert_eq!(by_recipient.len(), 8 * 25);

        // every indexed id must resolve to its primary record
        for r in by_sender {
            assert_eq!(mailbox.get(&r.message_id), Some(r));
        }
    }
}

//! Outstanding requests waiting for their answer.

use cdp_core::{CdpError, DiameterMessage, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Called once with the answer, or with `CdpError::Timeout`
pub type TransactionCallback = Box<dyn FnOnce(Result<DiameterMessage>) + Send>;

/// (end-to-end id, hop-by-hop id)
pub type TransactionKey = (u32, u32);

pub struct Transaction {
    pub request: DiameterMessage,
    pub started: Instant,
    pub expires: Instant,
    /// Free the entry once the callback has run
    pub auto_drop: bool,
    callback: Mutex<Option<TransactionCallback>>,
}

impl Transaction {
    /// Run the callback; later calls do nothing
    pub fn fire(&self, outcome: Result<DiameterMessage>) -> bool {
        match self.callback.lock().take() {
            Some(cb) => {
                cb(outcome);
                true
            }
            None => false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.callback.lock().is_none()
    }
}

#[derive(Default)]
pub struct TransactionManager {
    transactions: DashMap<TransactionKey, Transaction>,
}

fn key_of(msg: &DiameterMessage) -> TransactionKey {
    (msg.header.end_to_end_id, msg.header.hop_by_hop_id)
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        request: &DiameterMessage,
        callback: TransactionCallback,
        timeout: Duration,
        auto_drop: bool,
    ) -> TransactionKey {
        let now = Instant::now();
        let key = key_of(request);
        self.transactions.insert(
            key,
            Transaction {
                request: request.clone(),
                started: now,
                expires: now + timeout,
                auto_drop,
                callback: Mutex::new(Some(callback)),
            },
        );
        key
    }

    /// Remove and return the transaction `answer` belongs to
    pub fn take_by_answer(&self, answer: &DiameterMessage) -> Option<Transaction> {
        self.transactions.remove(&key_of(answer)).map(|(_, t)| t)
    }

    /// Free a transaction whose callback already ran
    pub fn drop_transaction(&self, key: TransactionKey) -> Option<Transaction> {
        self.transactions.remove(&key).map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Fire the timeout callback of every expired transaction. Returns how
    /// many fired.
    pub fn sweep(&self, now: Instant) -> usize {
        let expired: Vec<TransactionKey> = self
            .transactions
            .iter()
            .filter(|t| now > t.expires && !t.has_fired())
            .map(|t| *t.key())
            .collect();

        let mut fired = 0;
        for key in expired {
            // an answer may have taken it meanwhile
            let Some(transaction) = self.drop_transaction(key) else {
                continue;
            };
            debug!(
                end_to_end_id = key.0,
                hop_by_hop_id = key.1,
                command_code = transaction.request.command_code(),
                "transaction timed out"
            );
            let auto_drop = transaction.auto_drop;
            if transaction.fire(Err(CdpError::Timeout(format!(
                "no answer for end-to-end id {}",
                key.0
            )))) {
                fired += 1;
            }
            if !auto_drop {
                self.transactions.insert(key, transaction);
            }
        }
        fired
    }

    /// Fail every outstanding transaction
    pub fn fail_all(&self) {
        let keys: Vec<TransactionKey> = self.transactions.iter().map(|t| *t.key()).collect();
        for key in keys {
            if let Some((_, t)) = self.transactions.remove(&key) {
                t.fire(Err(CdpError::ShuttingDown));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_dict::command;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request(hbh: u32, e2e: u32) -> DiameterMessage {
        DiameterMessage::new_request(command::USER_AUTHORIZATION, 0, hbh, e2e)
    }

    fn counting() -> (TransactionCallback, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let answers = Arc::new(AtomicUsize::new(0));
        let timeouts = Arc::new(AtomicUsize::new(0));
        let (a, t) = (answers.clone(), timeouts.clone());
        let cb: TransactionCallback = Box::new(move |outcome| match outcome {
            Ok(_) => {
                a.fetch_add(1, Ordering::SeqCst);
            }
            Err(CdpError::Timeout(_)) => {
                t.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {}
        });
        (cb, answers, timeouts)
    }

    #[test]
    fn test_answer_matches_by_ids() {
        let tm = TransactionManager::new();
        let req = request(10, 20);
        let (cb, answers, _) = counting();
        tm.add(&req, cb, Duration::from_secs(5), true);

        let mut other = DiameterMessage::answer_to(&request(10, 21));
        assert!(tm.take_by_answer(&other).is_none());

        other = DiameterMessage::answer_to(&req);
        let t = tm.take_by_answer(&other).unwrap();
        assert!(t.fire(Ok(other.clone())));
        assert!(!t.fire(Ok(other)));
        assert_eq!(answers.load(Ordering::SeqCst), 1);
        assert!(tm.is_empty());
    }

    #[test]
    fn test_timeout_fires_once_and_drops() {
        let tm = TransactionManager::new();
        let (cb, _, timeouts) = counting();
        tm.add(&request(1, 1), cb, Duration::from_secs(1), true);

        let start = Instant::now();
        assert_eq!(tm.sweep(start), 0);
        assert_eq!(tm.sweep(start + Duration::from_millis(1100)), 1);
        assert_eq!(tm.sweep(start + Duration::from_millis(2200)), 0);
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        assert!(tm.is_empty());
    }

    #[test]
    fn test_timeout_without_auto_drop_keeps_entry() {
        let tm = TransactionManager::new();
        let (cb, _, timeouts) = counting();
        let key = tm.add(&request(2, 3), cb, Duration::from_secs(1), false);

        let later = Instant::now() + Duration::from_secs(2);
        assert_eq!(tm.sweep(later), 1);
        assert_eq!(tm.sweep(later), 0);
        assert_eq!(tm.len(), 1);
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);

        assert!(tm.drop_transaction(key).unwrap().has_fired());
        assert!(tm.is_empty());
    }

    #[test]
    fn test_fail_all() {
        let tm = TransactionManager::new();
        let (cb, answers, timeouts) = counting();
        tm.add(&request(5, 5), cb, Duration::from_secs(60), true);
        tm.fail_all();
        assert!(tm.is_empty());
        assert_eq!(answers.load(Ordering::SeqCst), 0);
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }
}

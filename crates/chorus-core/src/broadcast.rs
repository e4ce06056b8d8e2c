//! Fan-out of one inbound message to every other connected peer.
//!
//! Delivery follows slot scan order. There is no acknowledgement and no
//! retry: a peer that fails to accept the message is reported back to the
//! caller, which decides (via [`SendFailurePolicy`]) whether to disconnect it.

use std::{fmt, io};

use crate::{peer_io::PeerIo, pool::ClientPool};

/// What the relay does with a peer whose send failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendFailurePolicy {
    /// Treat the failure like a failed read: close the peer and free its slot.
    #[default]
    Disconnect,
    /// Log the failure and keep the peer registered.
    Skip,
}

/// Outcome of one broadcast.
#[derive(Debug, Default)]
pub struct BroadcastReport<H> {
    /// Peers the message was handed to, in delivery order
    pub delivered: Vec<H>,
    /// Peers whose send failed, with the error
    pub failed: Vec<(H, io::Error)>,
}

impl<H> BroadcastReport<H> {
    /// Whether every targeted peer accepted the message.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Send `message` to every occupied slot except `sender` and `listener`.
///
/// A failed send is recorded and delivery continues with the next peer.
pub fn broadcast<H, P>(
    pool: &ClientPool<H>,
    sender: H,
    listener: H,
    message: &[u8],
    io: &mut P,
) -> BroadcastReport<H>
where
    H: Copy + Eq + fmt::Debug,
    P: PeerIo<H>,
{
    let mut report = BroadcastReport { delivered: Vec::new(), failed: Vec::new() };

    for (_, target) in pool.occupied() {
        if target == sender || target == listener {
            continue;
        }

        match io.send(target, message) {
            Ok(()) => report.delivered.push(target),
            Err(e) => {
                tracing::warn!(?target, error = %e, "send failed");
                report.failed.push((target, e));
            },
        }
    }

    tracing::debug!(
        ?sender,
        bytes = message.len(),
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        "broadcast"
    );

    report
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;
    use crate::interest::Interest;

    #[derive(Default)]
    struct Recorder {
        inbox: HashMap<u32, Vec<Vec<u8>>>,
        broken: HashSet<u32>,
        closed: Vec<u32>,
    }

    impl PeerIo<u32> for Recorder {
        fn send(&mut self, handle: u32, message: &[u8]) -> io::Result<()> {
            if self.broken.contains(&handle) {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }
            self.inbox.entry(handle).or_default().push(message.to_vec());
            Ok(())
        }

        fn close(&mut self, handle: u32) {
            self.closed.push(handle);
        }
    }

    fn pool_with(handles: &[u32]) -> ClientPool<u32> {
        let mut pool = ClientPool::new(handles.len() + 1).unwrap();
        for &h in handles {
            pool.add(h, Interest::READABLE).unwrap();
        }
        pool
    }

    #[test]
    fn message_reaches_everyone_but_sender_and_listener() {
        let (listener, a, b, c) = (0, 1, 2, 3);
        let pool = pool_with(&[listener, a, b, c]);
        let mut io = Recorder::default();

        let report = broadcast(&pool, a, listener, b"hi", &mut io);

        assert!(report.is_clean());
        assert_eq!(report.delivered, vec![b, c]);
        assert_eq!(io.inbox[&b], vec![b"hi".to_vec()]);
        assert_eq!(io.inbox[&c], vec![b"hi".to_vec()]);
        assert!(!io.inbox.contains_key(&a));
        assert!(!io.inbox.contains_key(&listener));
    }

    #[test]
    fn failed_peer_does_not_stop_delivery() {
        let (listener, a, b, c) = (0, 1, 2, 3);
        let pool = pool_with(&[listener, a, b, c]);
        let mut io = Recorder::default();
        io.broken.insert(b);

        let report = broadcast(&pool, a, listener, b"hello", &mut io);

        assert_eq!(report.delivered, vec![c]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, b);
        assert_eq!(io.inbox[&c], vec![b"hello".to_vec()]);
        assert!(io.closed.is_empty(), "broadcast never closes peers itself");
    }

    #[test]
    fn lone_sender_reaches_nobody() {
        let pool = pool_with(&[0, 1]);
        let mut io = Recorder::default();

        let report = broadcast(&pool, 1, 0, b"echo?", &mut io);

        assert!(report.delivered.is_empty());
        assert!(io.inbox.is_empty());
    }

    #[test]
    fn default_policy_disconnects() {
        assert_eq!(SendFailurePolicy::default(), SendFailurePolicy::Disconnect);
    }
}

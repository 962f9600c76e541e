//! One-shot header rendezvous between the parser thread and the consumer.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::Error;
use crate::io::header::Header;

#[derive(Debug)]
enum Slot {
    Pending,
    Ready(Header),
    Failed(Error),
    Closed,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    cond: Condvar,
}

/// Producer side. Resolving or failing more than once is a silent no-op;
/// dropping an unresolved sender closes the slot so the consumer does not
/// block forever.
#[derive(Debug)]
pub struct HeaderSender {
    shared: Arc<Shared>,
}

/// Consumer side.
#[derive(Debug)]
pub struct HeaderReceiver {
    shared: Arc<Shared>,
}

pub fn header_channel() -> (HeaderSender, HeaderReceiver) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot::Pending),
        cond: Condvar::new(),
    });
    (
        HeaderSender {
            shared: shared.clone(),
        },
        HeaderReceiver { shared },
    )
}

impl HeaderSender {
    pub fn resolve(&self, header: Header) {
        self.put(Slot::Ready(header));
    }

    pub fn fail(&self, error: Error) {
        self.put(Slot::Failed(error));
    }

    fn put(&self, value: Slot) {
        let mut slot = self.shared.slot.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = value;
            self.shared.cond.notify_all();
        }
    }
}

impl Drop for HeaderSender {
    fn drop(&mut self) {
        self.put(Slot::Closed);
    }
}

impl HeaderReceiver {
    /// Blocks until the producer resolves the promise or goes away.
    pub fn recv(&self) -> Result<Header, Error> {
        let mut slot = self.shared.slot.lock();
        loop {
            match &*slot {
                Slot::Pending => self.shared.cond.wait(&mut slot),
                Slot::Ready(header) => return Ok(header.clone()),
                Slot::Failed(error) => return Err(error.clone()),
                Slot::Closed => return Err(Error::HeaderUnavailable),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    #[test]
    fn test_resolve_once() {
        let (tx, rx) = header_channel();
        let mut header = Header::new();
        header.set("version", "0.6");
        tx.resolve(header);
        // second resolution is a no-op
        tx.resolve(Header::new());
        assert_eq!(rx.recv().unwrap().get("version"), Some("0.6"));
        // the value stays readable
        assert_eq!(rx.recv().unwrap().get("version"), Some("0.6"));
    }

    #[test]
    fn test_fail() {
        let (tx, rx) = header_channel();
        tx.fail(Error::MissingRef);
        assert_eq!(rx.recv().unwrap_err(), Error::MissingRef);
    }

    #[test]
    fn test_dropped_sender_unblocks_receiver() {
        let (tx, rx) = header_channel();
        let waiter = thread::spawn(move || rx.recv());
        drop(tx);
        assert_eq!(
            waiter.join().unwrap().unwrap_err(),
            Error::HeaderUnavailable
        );
    }

    #[test]
    fn test_recv_blocks_until_resolved() {
        let (tx, rx) = header_channel();
        let producer = thread::spawn(move || {
            let mut header = Header::new();
            header.set("generator", "late");
            tx.resolve(header);
        });
        assert_eq!(rx.recv().unwrap().get("generator"), Some("late"));
        producer.join().unwrap();
    }
}

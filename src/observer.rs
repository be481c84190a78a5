//! Observer fan-out (C7, §4.7): synchronous event hooks for
//! connect/request/reply/file-list, delivered in registration order.

use crate::reply::Reply;
use std::sync::{Arc, Mutex};

/// A client-lifecycle observer. All methods default to a no-op so callers
/// only override what they need.
pub trait Observer: Send + Sync {
    /// Fired after the TCP connect, before the greeting is read.
    fn on_connected(&self, _host: &str, _port: u16) {}
    /// Fired before each command is written. A `PASS` command's argument is
    /// already redacted to `PASS *****` by the time this fires (§4.2).
    fn on_request(&self, _command: &str) {}
    /// Fired after each reply is received.
    fn on_reply(&self, _reply: &Reply) {}
    /// Fired after a full directory listing has been read.
    fn on_file_list(&self, _text: &str) {}
}

/// The client's observer list. Registration is by insertion; removal is by
/// pointer identity. The list is snapshotted (cloned `Arc` pointers) before
/// each dispatch so an observer may deregister itself, or another observer,
/// mid-callback without invalidating the iteration (§9).
#[derive(Default)]
pub struct ObserverList {
    observers: Mutex<Vec<Arc<dyn Observer>>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, returning nothing identifiable beyond the
    /// `Arc` the caller already holds — removal matches by pointer.
    pub fn add(&self, observer: Arc<dyn Observer>) {
        self.observers.lock().unwrap().push(observer);
    }

    /// Remove a previously registered observer by pointer identity.
    pub fn remove(&self, observer: &Arc<dyn Observer>) {
        let mut list = self.observers.lock().unwrap();
        list.retain(|o| !Arc::ptr_eq(o, observer));
    }

    fn snapshot(&self) -> Vec<Arc<dyn Observer>> {
        self.observers.lock().unwrap().clone()
    }

    pub fn dispatch_connected(&self, host: &str, port: u16) {
        for o in self.snapshot() {
            o.on_connected(host, port);
        }
    }

    pub fn dispatch_request(&self, command: &str) {
        let redacted;
        let command = if command.starts_with("PASS") {
            redacted = "PASS *****";
            redacted
        } else {
            command
        };
        for o in self.snapshot() {
            o.on_request(command);
        }
    }

    pub fn dispatch_reply(&self, reply: &Reply) {
        for o in self.snapshot() {
            o.on_reply(reply);
        }
    }

    pub fn dispatch_file_list(&self, text: &str) {
        for o in self.snapshot() {
            o.on_file_list(text);
        }
    }
}

//! An in-memory transport that records traffic and serves canned replies.

use super::Transport;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write(String),
    Read,
    Close,
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    replies: HashMap<String, String>,
    pending: VecDeque<String>,
}

/// Clones share the same call log, so keep one around to inspect what a
/// session did with the other.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every write of `command` with `reply` on the following read.
    pub fn with_reply(self, command: &str, reply: &str) -> Self {
        self.lock()
            .replies
            .insert(command.to_string(), reply.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Write(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// How many times `command` has been written.
    pub fn write_count(&self, command: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Write(c) if c == command))
            .count()
    }

    pub fn close_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| **call == Call::Close)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write(&mut self, command: &str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(Call::Write(command.to_string()));
        if let Some(reply) = state.replies.get(command).cloned() {
            state.pending.push_back(reply);
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(Call::Read);
        state
            .pending
            .pop_front()
            .ok_or_else(|| anyhow!("mock transport has no reply queued"))
    }

    async fn close(&mut self) -> Result<()> {
        self.lock().calls.push(Call::Close);
        Ok(())
    }
}

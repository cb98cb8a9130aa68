//! Scripted acquirer for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{AcquireError, Acquirer, Attempt};
use crate::domain::{Resource, ResourceId};

/// Scripted reply for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockReply {
    Acquired,
    Rejected(String),
    Error(String),
    Panic(String),
}

/// Acquirer that replays scripted replies per resource and records every call.
///
/// Resources with no script left answer with the default reply (rejected).
#[derive(Debug)]
pub struct MockAcquirer {
    scripts: Mutex<HashMap<ResourceId, VecDeque<MockReply>>>,
    default_reply: MockReply,
    delay: Duration,
    calls: Mutex<Vec<ResourceId>>,
}

impl Default for MockAcquirer {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAcquirer {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_reply: MockReply::Rejected("class is full".to_string()),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every unscripted attempt with `reply`
    pub fn with_default(mut self, reply: MockReply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Sleep this long inside every attempt
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue replies for one resource, consumed in order
    pub fn script(self, id: u64, replies: impl IntoIterator<Item = MockReply>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(ResourceId(id))
            .or_default()
            .extend(replies);
        self
    }

    /// Resources attempted so far, in call order
    pub fn calls(&self) -> Vec<ResourceId> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Acquirer for MockAcquirer {
    async fn attempt(&self, resource: &Resource) -> Result<Attempt, AcquireError> {
        self.calls.lock().unwrap().push(resource.id);

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&resource.id)
            .and_then(|replies| replies.pop_front())
            .unwrap_or_else(|| self.default_reply.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match reply {
            MockReply::Acquired => Ok(Attempt::Acquired),
            MockReply::Rejected(reason) => Ok(Attempt::Rejected { reason }),
            MockReply::Error(message) => Err(AcquireError::Network(message)),
            MockReply::Panic(message) => panic!("{}", message),
        }
    }
}

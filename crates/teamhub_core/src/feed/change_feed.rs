//! Topic-based change feed with drop-released subscriptions.

use log::debug;
use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Data set a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeedTopic {
    /// All membership records of one user.
    UserMemberships(String),
    /// All membership records of one team.
    TeamMembers(String),
}

impl FeedTopic {
    fn kind(&self) -> &'static str {
        match self {
            Self::UserMemberships(_) => "user_memberships",
            Self::TeamMembers(_) => "team_members",
        }
    }
}

/// Event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Changed,
    /// Service-level failure; terminal for the subscription.
    Failed(String),
}

/// Result of draining a subscription without blocking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPoll {
    /// Nothing new since the last poll.
    Idle,
    /// One or more changes were published; coalesced into one signal.
    Changed,
    Failed(String),
    /// The feed itself is gone.
    Closed,
}

struct Listener {
    topic: FeedTopic,
    sender: Sender<FeedEvent>,
}

#[derive(Default)]
struct FeedState {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

/// Cloneable handle; all clones share one listener table.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    state: Arc<Mutex<FeedState>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription on `topic`.
    pub fn subscribe(&self, topic: FeedTopic) -> FeedSubscription {
        let (sender, receiver) = channel();
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.insert(
            id,
            Listener {
                topic: topic.clone(),
                sender,
            },
        );
        debug!(
            "event=feed_subscribe module=feed topic={} subscription_id={id}",
            topic.kind()
        );

        FeedSubscription {
            id,
            topic,
            receiver,
            feed: Arc::downgrade(&self.state),
            finished: false,
        }
    }

    /// Notifies every subscriber of `topic` that its data changed.
    pub fn publish(&self, topic: &FeedTopic) {
        self.dispatch(topic, FeedEvent::Changed);
    }

    /// Delivers a terminal failure to every subscriber of `topic`.
    pub fn fail(&self, topic: &FeedTopic, reason: impl Into<String>) {
        self.dispatch(topic, FeedEvent::Failed(reason.into()));
    }

    /// Number of live subscriptions across all topics.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).listeners.len()
    }

    fn dispatch(&self, topic: &FeedTopic, event: FeedEvent) {
        let mut state = lock(&self.state);
        let mut disconnected = Vec::new();
        for (id, listener) in state
            .listeners
            .iter()
            .filter(|(_, listener)| &listener.topic == topic)
        {
            if listener.sender.send(event.clone()).is_err() {
                disconnected.push(*id);
            }
        }
        for id in disconnected {
            state.listeners.remove(&id);
        }
    }
}

/// Live registration on a [`ChangeFeed`] topic.
pub struct FeedSubscription {
    id: u64,
    topic: FeedTopic,
    receiver: Receiver<FeedEvent>,
    feed: Weak<Mutex<FeedState>>,
    finished: bool,
}

impl FeedSubscription {
    pub fn topic(&self) -> &FeedTopic {
        &self.topic
    }

    /// Drains pending events without blocking.
    ///
    /// Consecutive `Changed` events collapse into one; a `Failed` event wins
    /// over any change queued before it and finishes the subscription.
    pub fn poll(&mut self) -> FeedPoll {
        if self.finished {
            return FeedPoll::Closed;
        }

        let mut changed = false;
        loop {
            match self.receiver.try_recv() {
                Ok(FeedEvent::Changed) => changed = true,
                Ok(FeedEvent::Failed(reason)) => {
                    self.finish();
                    return FeedPoll::Failed(reason);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.finished = true;
                    return if changed {
                        FeedPoll::Changed
                    } else {
                        FeedPoll::Closed
                    };
                }
            }
        }

        if changed {
            FeedPoll::Changed
        } else {
            FeedPoll::Idle
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        if let Some(state) = self.feed.upgrade() {
            lock(&state).listeners.remove(&self.id);
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.finish();
        debug!(
            "event=feed_unsubscribe module=feed topic={} subscription_id={}",
            self.topic.kind(),
            self.id
        );
    }
}

fn lock(state: &Mutex<FeedState>) -> MutexGuard<'_, FeedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

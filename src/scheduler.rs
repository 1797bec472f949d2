//! Keyed, cancelable delayed execution.
//!
//! All timers share one [`DelayQueue`] (a hierarchical timer wheel) owned by a
//! single driver task. The pending callbacks live in a concurrent map keyed by
//! [`SchedulerKey`]; firing and canceling both remove the map entry, and only
//! the side that removes it gets to act. A canceled callback is dropped without
//! running, and a callback that already fired can no longer be canceled.

use dashmap::DashMap;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::time::{delay_queue, DelayQueue};
use uuid::Uuid;

/// The timeouts a session can have armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    Ping,
    /// Waiting for the client to acknowledge the packet with this ack id.
    Ack(u64),
    Upgrade,
}

/// Addresses one cancelable timer: at most one is armed per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedulerKey {
    pub session_id: Uuid,
    pub kind: TimeoutKind,
}

impl SchedulerKey {
    pub fn new(session_id: Uuid, kind: TimeoutKind) -> Self {
        Self { session_id, kind }
    }

    pub fn ping(session_id: Uuid) -> Self {
        Self::new(session_id, TimeoutKind::Ping)
    }

    pub fn ack(session_id: Uuid, ack_id: u64) -> Self {
        Self::new(session_id, TimeoutKind::Ack(ack_id))
    }

    pub fn upgrade(session_id: Uuid) -> Self {
        Self::new(session_id, TimeoutKind::Upgrade)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKey {
    Keyed(SchedulerKey),
    Anonymous(u64),
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

// The mutex only makes the map `Sync`; it is taken once, by whoever removes the entry.
struct Pending {
    generation: u64,
    callback: Mutex<Callback>,
}

enum DriverCommand {
    Arm {
        key: TimerKey,
        generation: u64,
        delay: Duration,
    },
    Disarm {
        generation: u64,
    },
    Stop,
}

pub struct Scheduler {
    timers: Arc<DashMap<TimerKey, Pending>>,
    driver: mpsc::UnboundedSender<DriverCommand>,
    generation: AtomicU64,
    stopped: AtomicBool,
}

impl Scheduler {
    /// Creates the scheduler and spawns its driver task on the current runtime.
    pub fn new() -> Self {
        let timers = Arc::new(DashMap::new());
        let (driver, commands) = mpsc::unbounded_channel();
        tokio::spawn(drive(Arc::clone(&timers), commands));
        Self {
            timers,
            driver,
            generation: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        }
    }

    /// Arms a one-shot timer under `key`, replacing any timer already armed for it.
    pub fn schedule<F>(&self, key: SchedulerKey, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.arm(TimerKey::Keyed(key), delay, Box::new(callback));
    }

    /// Arms a timer that can only be dropped by [`Scheduler::shutdown`].
    pub fn schedule_anonymous<F>(&self, delay: Duration, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.generation.fetch_add(1, Ordering::Relaxed);
        self.arm(TimerKey::Anonymous(id), delay, Box::new(callback));
    }

    /// Arms a timer that, when it fires, posts `message` to the owning
    /// connection's mailbox instead of acting on the timer task.
    pub fn schedule_on_context<T>(
        &self,
        key: SchedulerKey,
        delay: Duration,
        mailbox: &mpsc::UnboundedSender<T>,
        message: T,
    ) where
        T: Send + 'static,
    {
        let mailbox = mailbox.clone();
        self.schedule(key, delay, move || {
            if mailbox.send(message).is_err() {
                tracing::debug!(session = %key.session_id, kind = ?key.kind, "timeout fired for a closed connection");
            }
        });
    }

    /// Cancels the timer armed under `key`. Returns `false` when there was none
    /// or it already fired.
    pub fn cancel(&self, key: SchedulerKey) -> bool {
        match self.timers.remove(&TimerKey::Keyed(key)) {
            Some((_, pending)) => {
                self.disarm(pending.generation);
                true
            }
            None => false,
        }
    }

    /// Cancels every timer keyed to `session_id`, returning how many were armed.
    pub fn cancel_session(&self, session_id: Uuid) -> usize {
        let mut canceled = Vec::new();
        self.timers.retain(|key, pending| match key {
            TimerKey::Keyed(key) if key.session_id == session_id => {
                canceled.push(pending.generation);
                false
            }
            _ => true,
        });
        for generation in &canceled {
            self.disarm(*generation);
        }
        canceled.len()
    }

    pub fn is_scheduled(&self, key: SchedulerKey) -> bool {
        self.timers.contains_key(&TimerKey::Keyed(key))
    }

    /// Number of armed timers, anonymous ones included.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Drops every pending timer and stops the driver. Scheduling afterwards is
    /// logged and ignored.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.timers.clear();
        let _ = self.driver.send(DriverCommand::Stop);
        tracing::debug!("scheduler stopped");
    }

    fn arm(&self, key: TimerKey, delay: Duration, callback: Callback) {
        if self.stopped.load(Ordering::Acquire) {
            tracing::warn!(?key, "scheduler is shut down, timer dropped");
            return;
        }
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        if let Some(previous) = self.timers.insert(
            key,
            Pending {
                generation,
                callback: Mutex::new(callback),
            },
        ) {
            self.disarm(previous.generation);
        }
        let armed = self.driver.send(DriverCommand::Arm {
            key,
            generation,
            delay,
        });
        if armed.is_err() {
            self.timers.remove_if(&key, |_, pending| pending.generation == generation);
            tracing::warn!(?key, "scheduler driver is gone, timer dropped");
        }
    }

    fn disarm(&self, generation: u64) {
        let _ = self.driver.send(DriverCommand::Disarm { generation });
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.driver.send(DriverCommand::Stop);
    }
}

async fn drive(
    timers: Arc<DashMap<TimerKey, Pending>>,
    mut commands: mpsc::UnboundedReceiver<DriverCommand>,
) {
    let mut wheel: DelayQueue<(TimerKey, u64)> = DelayQueue::new();
    let mut slots: HashMap<u64, delay_queue::Key> = HashMap::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(DriverCommand::Arm { key, generation, delay }) => {
                    let slot = wheel.insert((key, generation), delay);
                    slots.insert(generation, slot);
                }
                Some(DriverCommand::Disarm { generation }) => {
                    if let Some(slot) = slots.remove(&generation) {
                        wheel.try_remove(&slot);
                    }
                }
                Some(DriverCommand::Stop) | None => break,
            },
            Some(expired) = wheel.next(), if !wheel.is_empty() => {
                let (key, generation) = expired.into_inner();
                slots.remove(&generation);
                let fired = timers.remove_if(&key, |_, pending| pending.generation == generation);
                if let Some((_, pending)) = fired {
                    let callback = pending
                        .callback
                        .into_inner()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    callback();
                }
            }
        }
    }
}

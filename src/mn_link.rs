//! Latency-delayed one-way links
//!
//! A [`Link`] never holds values itself: each `send` starts a small delivery
//! process that sleeps for the link delay and then drops the value into the
//! destination [`Channel`]. Several links may feed the same channel; values from
//! one link always arrive in the order they were sent.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::mn_interface::{ConfigError, LinkId, MinerId, SimTime};
use crate::mn_scheduler::{ConditionId, Outcome, Process, Scheduler, Step};

struct ChannelInner<T> {
    items: VecDeque<T>,
    getter: Option<ConditionId>,
    delivered: usize,
}

/// Arrival store on the receiving side of one or more links
pub struct Channel<T> {
    inner: Rc<RefCell<ChannelInner<T>>>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Channel<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(ChannelInner {
                items: VecDeque::new(),
                getter: None,
                delivered: 0,
            })),
        }
    }

    /// Make `value` available, handing it straight to a waiting receiver if any
    pub fn put<P: From<T> + 'static>(&self, sched: &mut Scheduler<P>, value: T) {
        let mut inner = self.inner.borrow_mut();
        inner.delivered += 1;
        match inner.getter.take() {
            Some(getter) if sched.is_pending(getter) => {
                sched.succeed(getter, value.into());
            }
            _ => inner.items.push_back(value),
        }
    }

    /// Condition that fires with the next value, oldest first. A channel has a
    /// single receiver: a new call replaces an earlier unfired one, which is
    /// discarded and never fires.
    pub fn receive<P: From<T> + 'static>(&self, sched: &mut Scheduler<P>) -> ConditionId {
        let condition = sched.event();
        let mut inner = self.inner.borrow_mut();
        if let Some(stale) = inner.getter.take() {
            sched.discard(stale);
        }
        match inner.items.pop_front() {
            Some(value) => {
                sched.succeed(condition, value.into());
            }
            None => inner.getter = Some(condition),
        }
        condition
    }

    /// Values that arrived but were not received yet
    pub fn len(&self) -> usize {
        self.inner.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values ever delivered into this channel
    pub fn delivered(&self) -> usize {
        self.inner.borrow().delivered
    }
}

impl<T: 'static> Default for Channel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// One-directional channel with a fixed propagation delay
pub struct Link<T> {
    pub id: LinkId,
    pub origin: MinerId,
    pub destination: MinerId,
    delay: SimTime,
    target: Channel<T>,
}

impl<T: 'static> Link<T> {
    pub fn new(
        id: LinkId,
        origin: MinerId,
        destination: MinerId,
        delay: SimTime,
        target: Channel<T>,
    ) -> Result<Self, ConfigError> {
        if !(delay >= 0.0) {
            return Err(ConfigError::NegativeDelay(delay));
        }
        Ok(Self {
            id,
            origin,
            destination,
            delay,
            target,
        })
    }

    pub fn delay(&self) -> SimTime {
        self.delay
    }

    /// Value becomes receivable at exactly `now + delay`
    pub fn send<P>(&self, sched: &mut Scheduler<P>, value: T)
    where
        P: From<T> + Default + 'static,
    {
        sched.spawn(Box::new(Delivery {
            target: self.target.clone(),
            delay: self.delay,
            value: Some(value),
        }));
    }
}

/// In-flight value on a link
struct Delivery<T> {
    target: Channel<T>,
    delay: SimTime,
    value: Option<T>,
}

impl<T, P> Process<P> for Delivery<T>
where
    T: 'static,
    P: From<T> + Default + 'static,
{
    fn resume(&mut self, sched: &mut Scheduler<P>, outcome: Outcome<P>) -> Step {
        match outcome {
            Outcome::Started => Step::WaitForAny(vec![sched.schedule_after(self.delay)]),
            Outcome::Fired(_) => {
                if let Some(value) = self.value.take() {
                    self.target.put(sched, value);
                }
                Step::Done
            }
            Outcome::Interrupted => Step::Done,
        }
    }
}

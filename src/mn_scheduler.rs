//! Virtual-time scheduler and cooperative processes
//!
//! A [`Process`] is an explicit state machine. The scheduler resumes it with an
//! [`Outcome`] and the process answers with a [`Step`]: either wait for any of a
//! set of conditions, or finish. Only one process runs at a time, and only between
//! its suspension points, so processes can share state through `Rc<RefCell<_>>`
//! without further locking.
//!
//! Conditions come in two flavours:
//! - timeouts, created with [`Scheduler::schedule_after`], which fire by themselves
//! - events, created with [`Scheduler::event`], which fire when someone calls
//!   [`Scheduler::succeed`]
//!
//! Every wakeup goes through one priority queue ordered by `(due_time, sequence)`.
//! The sequence is the creation order of the entry, which makes equal-time wakeups
//! run first-in first-out and every run reproducible.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use hashbrown::HashMap;
use log::trace;

use crate::mn_interface::SimTime;

pub type ProcessId = usize;
pub type ConditionId = u64;

/// What a process is told when it is resumed
#[derive(Debug)]
pub enum Outcome<P> {
    /// First resumption after [`Scheduler::spawn`]
    Started,
    /// Every awaited condition that had fired by the time of resumption,
    /// in the order they were passed to [`Step::WaitForAny`]
    Fired(Vec<(ConditionId, P)>),
    /// The wait was cut short by [`Scheduler::interrupt`]
    Interrupted,
}

impl<P> Outcome<P> {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Outcome::Interrupted)
    }
}

/// What a process asks for when it yields
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Suspend until the first of these conditions fires
    WaitForAny(Vec<ConditionId>),
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessState {
    Runnable,
    Waiting(Vec<ConditionId>),
    Terminated,
}

pub trait Process<P> {
    fn resume(&mut self, sched: &mut Scheduler<P>, outcome: Outcome<P>) -> Step;
}

enum ConditionState<P> {
    /// Event nobody has succeeded yet
    Pending,
    /// Timeout waiting for its due time
    Scheduled(P),
    /// Fired, value not yet handed to a process
    Triggered(P),
}

struct Condition<P> {
    state: ConditionState<P>,
    waiter: Option<ProcessId>,
    // timeouts are dropped when they fire with nobody listening
    transient: bool,
}

struct Slot<P> {
    process: Option<Box<dyn Process<P>>>,
    state: ProcessState,
    interrupt_pending: bool,
    // a Resume entry is queued for this process
    resume_pending: bool,
}

#[derive(Debug, Clone, Copy)]
enum Target {
    Start(ProcessId),
    Fire(ConditionId),
    /// Hand a waiter everything that fired up to this point of the instant
    Resume(ProcessId),
    Interrupt(ProcessId),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    due: SimTime,
    sequence: u64,
    target: Target,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .total_cmp(&other.due)
            .then(self.sequence.cmp(&other.sequence))
    }
}

/// Owner of virtual time and of every process in a simulation
pub struct Scheduler<P> {
    now: SimTime,
    queue: BinaryHeap<Reverse<Entry>>,
    next_sequence: u64,
    next_condition: ConditionId,
    conditions: HashMap<ConditionId, Condition<P>>,
    processes: Vec<Slot<P>>,
    events_processed: u64,
}

impl<P: 'static> Scheduler<P> {
    pub fn new() -> Self {
        Self {
            now: 0.0,
            queue: BinaryHeap::new(),
            next_sequence: 0,
            next_condition: 1,
            conditions: HashMap::new(),
            processes: Vec::new(),
            events_processed: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of queue entries popped so far
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    pub fn pending_entries(&self) -> usize {
        self.queue.len()
    }

    pub fn process_state(&self, pid: ProcessId) -> Option<&ProcessState> {
        self.processes.get(pid).map(|slot| &slot.state)
    }

    /// Register a process. It is first resumed with [`Outcome::Started`] at the
    /// current instant, after everything already queued for this instant.
    pub fn spawn(&mut self, process: Box<dyn Process<P>>) -> ProcessId {
        let pid = self.processes.len();
        self.processes.push(Slot {
            process: Some(process),
            state: ProcessState::Runnable,
            interrupt_pending: false,
            resume_pending: false,
        });
        self.push(self.now, Target::Start(pid));
        pid
    }

    /// One-shot wakeup at `now + delay` carrying `value`
    pub fn schedule_after_with(&mut self, delay: SimTime, value: P) -> ConditionId {
        let id = self.new_condition(ConditionState::Scheduled(value), true);
        self.push(self.now + delay.max(0.0), Target::Fire(id));
        id
    }

    /// One-shot wakeup at `now + delay`
    pub fn schedule_after(&mut self, delay: SimTime) -> ConditionId
    where
        P: Default,
    {
        self.schedule_after_with(delay, P::default())
    }

    /// A condition that fires only when [`Scheduler::succeed`] is called on it
    pub fn event(&mut self) -> ConditionId {
        self.new_condition(ConditionState::Pending, false)
    }

    /// Fire an event at the current instant. Returns false, and drops `value`,
    /// if the condition is unknown or has already fired.
    pub fn succeed(&mut self, id: ConditionId, value: P) -> bool {
        match self.conditions.get_mut(&id) {
            Some(condition) if matches!(condition.state, ConditionState::Pending) => {
                condition.state = ConditionState::Triggered(value);
                self.push(self.now, Target::Fire(id));
                true
            }
            _ => false,
        }
    }

    /// True while an event is still waiting to be succeeded
    pub fn is_pending(&self, id: ConditionId) -> bool {
        matches!(
            self.conditions.get(&id).map(|c| &c.state),
            Some(ConditionState::Pending)
        )
    }

    pub fn is_triggered(&self, id: ConditionId) -> bool {
        matches!(
            self.conditions.get(&id).map(|c| &c.state),
            Some(ConditionState::Triggered(_))
        )
    }

    /// Consume the value of a fired condition without waiting for it
    pub fn take(&mut self, id: ConditionId) -> Option<P> {
        if !self.is_triggered(id) {
            return None;
        }
        match self.conditions.remove(&id).map(|c| c.state) {
            Some(ConditionState::Triggered(value)) => Some(value),
            _ => None,
        }
    }

    /// Forget a condition nobody will wait on any more. A queued fire for it
    /// becomes a no-op.
    pub fn discard(&mut self, id: ConditionId) {
        self.conditions.remove(&id);
    }

    /// Ask a waiting process to unwind with [`Outcome::Interrupted`] at the next
    /// scheduling point. Repeated interrupts before delivery collapse into one;
    /// terminated processes are left alone.
    pub fn interrupt(&mut self, pid: ProcessId) {
        let Some(slot) = self.processes.get_mut(pid) else {
            return;
        };
        if slot.state == ProcessState::Terminated || slot.interrupt_pending {
            return;
        }
        slot.interrupt_pending = true;
        self.push(self.now, Target::Interrupt(pid));
    }

    /// Pop and dispatch entries in `(due_time, sequence)` order until the next
    /// one lies beyond `horizon` or nothing is left. Time then rests at `horizon`.
    pub fn run_until(&mut self, horizon: SimTime) {
        while let Some(Reverse(entry)) = self.queue.peek() {
            if entry.due > horizon {
                break;
            }
            let Some(Reverse(entry)) = self.queue.pop() else {
                break;
            };

            debug_assert!(entry.due >= self.now, "time must never run backwards");
            self.now = entry.due;
            self.events_processed += 1;

            match entry.target {
                Target::Start(pid) => self.resume(pid, Outcome::Started),
                Target::Fire(id) => self.fire(id),
                Target::Resume(pid) => self.resume_waiter(pid),
                Target::Interrupt(pid) => self.deliver_interrupt(pid),
            }
        }

        if horizon.is_finite() && horizon > self.now {
            self.now = horizon;
        }
    }

    fn new_condition(&mut self, state: ConditionState<P>, transient: bool) -> ConditionId {
        let id = self.next_condition;
        self.next_condition += 1;
        self.conditions.insert(
            id,
            Condition {
                state,
                waiter: None,
                transient,
            },
        );
        id
    }

    fn push(&mut self, due: SimTime, target: Target) {
        let entry = Entry {
            due,
            sequence: self.next_sequence,
            target,
        };
        self.next_sequence += 1;
        self.queue.push(Reverse(entry));
    }

    fn fire(&mut self, id: ConditionId) {
        let Some(condition) = self.conditions.get_mut(&id) else {
            // already consumed
            return;
        };

        if matches!(condition.state, ConditionState::Scheduled(_)) {
            if let ConditionState::Scheduled(value) =
                std::mem::replace(&mut condition.state, ConditionState::Pending)
            {
                condition.state = ConditionState::Triggered(value);
            }
        }

        let Some(pid) = condition.waiter else {
            if condition.transient {
                self.conditions.remove(&id);
            }
            return;
        };

        // resume later in this instant, so every fire due now is collected together
        self.schedule_resume(pid);
    }

    fn schedule_resume(&mut self, pid: ProcessId) {
        let slot = &mut self.processes[pid];
        if slot.resume_pending || !matches!(slot.state, ProcessState::Waiting(_)) {
            return;
        }
        slot.resume_pending = true;
        self.push(self.now, Target::Resume(pid));
    }

    fn resume_waiter(&mut self, pid: ProcessId) {
        let slot = &mut self.processes[pid];
        if !slot.resume_pending {
            return;
        }
        slot.resume_pending = false;

        let waiting_on = match &slot.state {
            ProcessState::Waiting(conditions) => conditions.clone(),
            _ => return,
        };

        // everything already fired for this waiter is handed over together
        let mut fired = Vec::new();
        for cid in &waiting_on {
            if let Some(value) = self.take(*cid) {
                fired.push((*cid, value));
            }
        }
        if fired.is_empty() {
            // consumed elsewhere with `take`, keep waiting
            return;
        }
        self.release(&waiting_on);

        trace!("t={} resume {} with {} fired", self.now, pid, fired.len());
        self.resume(pid, Outcome::Fired(fired));
    }

    fn deliver_interrupt(&mut self, pid: ProcessId) {
        let slot = &mut self.processes[pid];
        if !slot.interrupt_pending {
            return;
        }
        slot.interrupt_pending = false;
        // a queued Resume for the old wait is void now
        slot.resume_pending = false;

        let waiting_on = match &slot.state {
            ProcessState::Waiting(conditions) => conditions.clone(),
            _ => return,
        };
        self.release(&waiting_on);

        trace!("t={} interrupt {}", self.now, pid);
        self.resume(pid, Outcome::Interrupted);
    }

    /// Unsubscribe a process from conditions it no longer waits on
    fn release(&mut self, conditions: &[ConditionId]) {
        for cid in conditions {
            let Some(condition) = self.conditions.get_mut(cid) else {
                continue;
            };
            condition.waiter = None;
            // a fired timeout nobody will collect
            if condition.transient && matches!(condition.state, ConditionState::Triggered(_)) {
                self.conditions.remove(cid);
            }
        }
    }

    fn resume(&mut self, pid: ProcessId, outcome: Outcome<P>) {
        let Some(mut process) = self.processes[pid].process.take() else {
            return;
        };
        self.processes[pid].state = ProcessState::Runnable;

        let step = process.resume(self, outcome);

        match step {
            Step::WaitForAny(conditions) => {
                self.processes[pid].process = Some(process);
                self.wait_for_any(pid, conditions);
            }
            Step::Done => {
                let slot = &mut self.processes[pid];
                slot.state = ProcessState::Terminated;
                slot.interrupt_pending = false;
                slot.resume_pending = false;
            }
        }
    }

    fn wait_for_any(&mut self, pid: ProcessId, conditions: Vec<ConditionId>) {
        let mut ready = false;
        for cid in &conditions {
            if let Some(condition) = self.conditions.get_mut(cid) {
                condition.waiter = Some(pid);
                ready |= matches!(condition.state, ConditionState::Triggered(_));
            }
        }
        self.processes[pid].state = ProcessState::Waiting(conditions);

        // fired before anyone was listening: wake through the queue like any other fire
        if ready {
            self.schedule_resume(pid);
        }
    }
}

impl<P: 'static> Default for Scheduler<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Trace = Rc<RefCell<Vec<(SimTime, &'static str)>>>;

    /// Sleeps `delay`, records `name`, done
    struct Sleeper {
        name: &'static str,
        delay: SimTime,
        trace: Trace,
    }

    impl Process<u32> for Sleeper {
        fn resume(&mut self, sched: &mut Scheduler<u32>, outcome: Outcome<u32>) -> Step {
            match outcome {
                Outcome::Started => Step::WaitForAny(vec![sched.schedule_after(self.delay)]),
                Outcome::Fired(_) => {
                    self.trace.borrow_mut().push((sched.now(), self.name));
                    Step::Done
                }
                Outcome::Interrupted => {
                    self.trace.borrow_mut().push((sched.now(), "interrupted"));
                    Step::Done
                }
            }
        }
    }

    /// Waits on a fixed set of conditions once and records what fired
    struct Waiter {
        conditions: Vec<ConditionId>,
        seen: Rc<RefCell<Vec<Vec<(ConditionId, u32)>>>>,
    }

    impl Process<u32> for Waiter {
        fn resume(&mut self, _sched: &mut Scheduler<u32>, outcome: Outcome<u32>) -> Step {
            match outcome {
                Outcome::Started => Step::WaitForAny(self.conditions.clone()),
                Outcome::Fired(fired) => {
                    self.seen.borrow_mut().push(fired);
                    Step::Done
                }
                Outcome::Interrupted => Step::Done,
            }
        }
    }

    /// Fires the given events with the given values when started
    struct Trigger {
        events: Vec<(ConditionId, u32)>,
    }

    impl Process<u32> for Trigger {
        fn resume(&mut self, sched: &mut Scheduler<u32>, _outcome: Outcome<u32>) -> Step {
            for (id, value) in self.events.drain(..) {
                sched.succeed(id, value);
            }
            Step::Done
        }
    }

    fn sleeper(name: &'static str, delay: SimTime, trace: &Trace) -> Box<Sleeper> {
        Box::new(Sleeper {
            name,
            delay,
            trace: trace.clone(),
        })
    }

    #[test]
    fn test_time_order() {
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new();

        sched.spawn(sleeper("late", 5.0, &trace));
        sched.spawn(sleeper("early", 1.0, &trace));
        sched.spawn(sleeper("middle", 2.5, &trace));
        sched.run_until(10.0);

        assert_eq!(
            *trace.borrow(),
            vec![(1.0, "early"), (2.5, "middle"), (5.0, "late")]
        );
        assert_eq!(sched.now(), 10.0);
    }

    #[test]
    fn test_equal_times_run_in_scheduling_order() {
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new();

        sched.spawn(sleeper("a", 3.0, &trace));
        sched.spawn(sleeper("b", 3.0, &trace));
        sched.spawn(sleeper("c", 3.0, &trace));
        sched.run_until(3.0);

        let names: Vec<_> = trace.borrow().iter().map(|(_, n)| *n).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_horizon_stops_before_later_entries() {
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new();

        sched.spawn(sleeper("inside", 4.0, &trace));
        sched.spawn(sleeper("outside", 6.0, &trace));
        sched.run_until(5.0);

        assert_eq!(*trace.borrow(), vec![(4.0, "inside")]);
        assert_eq!(sched.pending_entries(), 1);

        // continuing picks up where it stopped
        sched.run_until(10.0);
        assert_eq!(trace.borrow().len(), 2);
    }

    #[test]
    fn test_interrupt_cuts_wait_short() {
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new();

        let pid = sched.spawn(sleeper("never", 100.0, &trace));
        sched.run_until(1.0);
        sched.interrupt(pid);
        sched.run_until(200.0);

        assert_eq!(*trace.borrow(), vec![(1.0, "interrupted")]);
        assert_eq!(sched.process_state(pid), Some(&ProcessState::Terminated));
    }

    #[test]
    fn test_interrupt_terminated_is_ignored() {
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new();

        let pid = sched.spawn(sleeper("quick", 1.0, &trace));
        sched.run_until(2.0);
        sched.interrupt(pid);
        sched.run_until(3.0);

        assert_eq!(*trace.borrow(), vec![(1.0, "quick")]);
    }

    #[test]
    fn test_simultaneous_fires_are_returned_together() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut sched: Scheduler<u32> = Scheduler::new();

        let a = sched.event();
        let b = sched.event();
        sched.spawn(Box::new(Waiter {
            conditions: vec![a, b],
            seen: seen.clone(),
        }));
        sched.run_until(1.0);

        sched.spawn(Box::new(Trigger {
            events: vec![(b, 20), (a, 10)],
        }));
        sched.run_until(2.0);

        assert_eq!(*seen.borrow(), vec![vec![(a, 10), (b, 20)]]);
    }

    #[test]
    fn test_same_instant_timeouts_are_returned_together() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut sched: Scheduler<u32> = Scheduler::new();

        let a = sched.schedule_after_with(5.0, 1);
        let b = sched.schedule_after_with(5.0, 2);
        let later = sched.schedule_after_with(6.0, 3);
        sched.spawn(Box::new(Waiter {
            conditions: vec![a, b, later],
            seen: seen.clone(),
        }));
        sched.run_until(10.0);

        assert_eq!(*seen.borrow(), vec![vec![(a, 1), (b, 2)]]);
        // the unobserved later timeout is dropped when it fires
        assert!(!sched.is_triggered(later));
    }

    #[test]
    fn test_discard_drops_condition() {
        let mut sched: Scheduler<u32> = Scheduler::new();

        let a = sched.event();
        sched.discard(a);
        assert!(!sched.is_pending(a));
        assert!(!sched.succeed(a, 1));
        assert!(sched.conditions.is_empty());
    }

    #[test]
    fn test_single_fire_leaves_other_event_pending() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut sched: Scheduler<u32> = Scheduler::new();

        let a = sched.event();
        let b = sched.event();
        sched.spawn(Box::new(Waiter {
            conditions: vec![a, b],
            seen: seen.clone(),
        }));
        sched.spawn(Box::new(Trigger {
            events: vec![(b, 7)],
        }));
        sched.run_until(1.0);

        assert_eq!(*seen.borrow(), vec![vec![(b, 7)]]);
        assert!(sched.is_pending(a));
    }

    #[test]
    fn test_wait_on_already_fired_event() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut sched: Scheduler<u32> = Scheduler::new();

        let a = sched.event();
        assert!(sched.succeed(a, 3));
        assert!(!sched.succeed(a, 4));
        sched.run_until(1.0);
        assert!(sched.is_triggered(a));

        sched.spawn(Box::new(Waiter {
            conditions: vec![a],
            seen: seen.clone(),
        }));
        sched.run_until(2.0);

        assert_eq!(*seen.borrow(), vec![vec![(a, 3)]]);
    }

    #[test]
    fn test_take_consumes_value() {
        let mut sched: Scheduler<u32> = Scheduler::new();

        let a = sched.event();
        assert_eq!(sched.take(a), None);
        sched.succeed(a, 9);
        assert_eq!(sched.take(a), Some(9));
        assert_eq!(sched.take(a), None);

        // the queued fire finds nothing and is harmless
        sched.run_until(1.0);
        assert_eq!(sched.events_processed(), 1);
    }

    #[test]
    fn test_abandoned_timeout_is_dropped() {
        let trace: Trace = Rc::new(RefCell::new(Vec::new()));
        let mut sched = Scheduler::new();

        let pid = sched.spawn(sleeper("never", 5.0, &trace));
        sched.interrupt(pid);
        sched.run_until(10.0);

        assert!(sched.conditions.is_empty());
    }
}

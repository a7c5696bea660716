// Miner agent
//
// A miner is three cooperating processes around one shared `MinerState`:
// - mining: exponential inter-arrival waits, interrupted whenever blocks need validating
// - validation: verifies queued blocks one at a time and integrates them into the chain
// - receive: handles protocol messages arriving on the miner's inbound channel
//
// Chain state is only touched from inside these processes, and mining stays
// paused for as long as validation has work, so the two never interleave.

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use hashbrown::HashMap;
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Exp};

use crate::mn_blocks::Block;
use crate::mn_chain::{ChainView, Verdict};
use crate::mn_events::{Event, SharedSink};
use crate::mn_interface::{
    Action, BlockId, ConfigError, MinerId, Origin, ProtocolMessage, SharedRecorder, Signal,
    SimTime, MAX_BLOCK_SIZE,
};
use crate::mn_link::{Channel, Link};
use crate::mn_scheduler::{ConditionId, Outcome, Process, ProcessId, Scheduler, Step};

#[derive(Debug, Clone, PartialEq)]
pub struct MinerConfig {
    /// Expected blocks per unit of time
    pub hashrate: f64,
    /// Bytes verified per unit of time
    pub verify_rate: f64,
    /// Uniform block size draw, `[low, high)` bytes
    pub block_size_range: (f64, f64),
    /// Minimum time before an unanswered block request may be repeated.
    /// `None` never repeats.
    pub request_timeout: Option<SimTime>,
}

impl MinerConfig {
    pub fn new(hashrate: f64, verify_rate: f64) -> Self {
        Self {
            hashrate,
            verify_rate,
            block_size_range: (0.0, MAX_BLOCK_SIZE),
            request_timeout: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.hashrate > 0.0) || !self.hashrate.is_finite() {
            return Err(ConfigError::NonPositiveHashrate(self.hashrate));
        }
        if !(self.verify_rate > 0.0) {
            return Err(ConfigError::NonPositiveVerifyRate(self.verify_rate));
        }
        let (low, high) = self.block_size_range;
        if !(low >= 0.0) || !(high >= low) || !high.is_finite() {
            return Err(ConfigError::InvalidBlockSize(low, high));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MinerStats {
    pub mined: usize,
    pub integrated: usize,
    pub rejected: usize,
    pub orphaned: usize,
    pub duplicates: usize,
    pub requests_sent: usize,
    pub responses_sent: usize,
    pub announcements: usize,
}

pub struct MinerState {
    id: MinerId,
    config: MinerConfig,
    inter_arrival: Exp<f64>,
    rng: StdRng,
    chain: ChainView,
    peers: Vec<Link<ProtocolMessage>>,

    // validation work
    queue: VecDeque<(Rc<Block>, Origin)>,
    backlog: VecDeque<(Rc<Block>, Origin)>,
    verifying: Option<BlockId>,
    validating: bool,

    // signals between the processes
    mined_signal: ConditionId,
    received_signal: ConditionId,
    continue_signal: ConditionId,
    mining: Option<ProcessId>,
    mining_enabled: bool,
    mining_paused: bool,

    // block id -> time of the last request
    requests: HashMap<BlockId, SimTime>,
    stats: MinerStats,
    event_sink: SharedSink,
    recorder: SharedRecorder,
}

impl MinerState {
    pub fn id(&self) -> MinerId {
        self.id
    }

    pub fn chain(&self) -> &ChainView {
        &self.chain
    }

    pub fn stats(&self) -> &MinerStats {
        &self.stats
    }

    /// Blocks requested and not yet received
    pub fn outstanding_requests(&self) -> usize {
        self.requests.len()
    }

    fn log(&self, time: SimTime, event: Event) {
        self.event_sink.borrow_mut().log(time, self.id, event);
    }

    /// Known, parked, queued or being verified right now
    fn holds(&self, block: &BlockId) -> bool {
        self.chain.contains(block)
            || self.chain.is_pending(block)
            || self.verifying == Some(*block)
            || self.queue.iter().any(|(b, _)| b.id == *block)
            || self.backlog.iter().any(|(b, _)| b.id == *block)
    }

    fn draw(&mut self) -> (f64, SimTime) {
        let (low, high) = self.config.block_size_range;
        let size = if high > low {
            self.rng.gen_range(low..high)
        } else {
            low
        };
        let wait = self.inter_arrival.sample(&mut self.rng);
        (size, wait)
    }

    fn mine_block(&mut self, sched: &mut Scheduler<Signal>, size: f64) {
        let now = sched.now();
        let parent = self.chain.head_block().clone();
        let block = Rc::new(Block::new(
            Some(parent.id),
            parent.height + 1,
            now,
            self.id,
            size,
        ));

        self.stats.mined += 1;
        {
            let mut recorder = self.recorder.borrow_mut();
            recorder.record_block(&block);
            recorder.record_ownership(self.id, block.id);
        }
        self.log(
            now,
            Event::BlockMined {
                block_id: block.id,
                height: block.height,
            },
        );
        debug!(
            "{:.4} miner {} mined {:x} at height {}",
            now, self.id, block.id, block.height
        );

        self.notify(sched, block, Origin::Mined);
    }

    /// Hand a block to the validation process. The block itself always waits
    /// in `backlog`; the signal only wakes the validator.
    fn notify(&mut self, sched: &mut Scheduler<Signal>, block: Rc<Block>, origin: Origin) {
        let signal = match origin {
            Origin::Mined => self.mined_signal,
            Origin::Peer(_) => self.received_signal,
        };
        self.backlog.push_back((block, origin));
        if sched.is_pending(signal) {
            sched.succeed(signal, Signal::Wake);
        }
    }

    fn renew_signal(&mut self, sched: &mut Scheduler<Signal>, consumed: ConditionId) {
        if consumed == self.mined_signal {
            self.mined_signal = sched.event();
        } else if consumed == self.received_signal {
            self.received_signal = sched.event();
        }
    }

    /// Blocks that showed up while validation was busy
    fn drain_signals(&mut self, sched: &mut Scheduler<Signal>) -> Vec<(Rc<Block>, Origin)> {
        for signal in [self.mined_signal, self.received_signal] {
            if sched.take(signal).is_some() {
                self.renew_signal(sched, signal);
            }
        }
        self.backlog.drain(..).collect()
    }

    /// Classify a verified block and act on the verdict
    fn conclude(&mut self, sched: &mut Scheduler<Signal>, block: Rc<Block>, origin: Origin) {
        let now = sched.now();
        self.requests.remove(&block.id);

        match self.chain.classify(&block) {
            Verdict::Valid => {
                let result = self.chain.integrate(block.clone());
                self.stats.integrated += 1;
                if result.head_changed {
                    self.announce(sched, &block);
                }
                for orphan in result.unblocked {
                    let origin = Origin::Peer(orphan.miner);
                    self.queue.push_back((orphan, origin));
                }
            }
            Verdict::MissingParent => {
                let Some(parent) = block.parent else {
                    return;
                };
                self.log(
                    now,
                    Event::DataNeeded {
                        block_id: block.id,
                        parent,
                    },
                );
                if self.chain.park(block) {
                    self.stats.orphaned += 1;
                }
                let source = match origin {
                    Origin::Peer(peer) => Some(peer),
                    Origin::Mined => None,
                };
                self.request_block(sched, parent, source);
            }
            Verdict::Invalid(reason) => {
                self.stats.rejected += 1;
                debug!(
                    "{:.4} miner {} dropped {:x} ({})",
                    now,
                    self.id,
                    block.id,
                    reason.as_str()
                );
                self.log(
                    now,
                    Event::BlockRejected {
                        block_id: block.id,
                        reason: reason.as_str(),
                    },
                );
            }
        }
    }

    fn announce(&mut self, sched: &mut Scheduler<Signal>, block: &Block) {
        self.stats.announcements += 1;
        self.log(
            sched.now(),
            Event::HeadAnnounced {
                block_id: block.id,
                height: block.height,
            },
        );
        self.broadcast(sched, Action::AnnounceHead(block.id));
    }

    /// Ask for a block, at most once per outstanding id (or once per timeout)
    fn request_block(
        &mut self,
        sched: &mut Scheduler<Signal>,
        block: BlockId,
        source: Option<MinerId>,
    ) {
        let now = sched.now();
        if let Some(last) = self.requests.get(&block) {
            match self.config.request_timeout {
                Some(timeout) if now - last >= timeout => {}
                _ => return,
            }
        }
        self.requests.insert(block, now);
        self.stats.requests_sent += 1;

        let target = source.filter(|peer| self.link_to(*peer).is_some());
        self.log(
            now,
            Event::BlockRequested {
                block_id: block,
                to: target,
            },
        );
        match target {
            Some(peer) => {
                self.send_to(sched, peer, Action::RequestBlock(block));
            }
            None => self.broadcast(sched, Action::RequestBlock(block)),
        }
    }

    fn link_to(&self, peer: MinerId) -> Option<&Link<ProtocolMessage>> {
        self.peers.iter().find(|link| link.destination == peer)
    }

    fn send_to(&self, sched: &mut Scheduler<Signal>, peer: MinerId, action: Action) -> bool {
        let Some(link) = self.link_to(peer) else {
            return false;
        };
        link.send(
            sched,
            ProtocolMessage {
                destination: peer,
                origin: self.id,
                action,
            },
        );
        true
    }

    fn broadcast(&self, sched: &mut Scheduler<Signal>, action: Action) {
        for link in &self.peers {
            link.send(
                sched,
                ProtocolMessage {
                    destination: link.destination,
                    origin: self.id,
                    action: action.clone(),
                },
            );
        }
    }

    fn handle_message(&mut self, sched: &mut Scheduler<Signal>, msg: ProtocolMessage) {
        let now = sched.now();
        if msg.destination != self.id {
            debug!("{:.4} miner {} got mail for {}", now, self.id, msg.destination);
            return;
        }

        match msg.action {
            Action::RequestBlock(block_id) => {
                self.log(
                    now,
                    Event::RequestReceived {
                        block_id,
                        from: msg.origin,
                    },
                );
                // unknown blocks get no answer at all
                if let Some(block) = self.chain.get(&block_id).cloned() {
                    if self.send_to(sched, msg.origin, Action::DeliverBlock(block)) {
                        self.stats.responses_sent += 1;
                    }
                }
            }
            Action::DeliverBlock(block) => {
                self.log(
                    now,
                    Event::ResponseReceived {
                        block_id: block.id,
                        from: msg.origin,
                    },
                );
                if self.holds(&block.id) {
                    self.stats.duplicates += 1;
                    self.requests.remove(&block.id);
                } else {
                    self.notify(sched, block, Origin::Peer(msg.origin));
                }
            }
            Action::AnnounceHead(block_id) => {
                self.log(
                    now,
                    Event::HeadReceived {
                        block_id,
                        from: msg.origin,
                    },
                );
                if !self.holds(&block_id) {
                    self.request_block(sched, block_id, Some(msg.origin));
                }
            }
        }
    }
}

// ============================================================================
// Processes
// ============================================================================

enum MiningPhase {
    Idle,
    Mining { size: f64 },
    Paused,
}

/// Mining -> Interrupted -> (wait for permission) -> Mining
struct MiningProcess {
    state: Rc<RefCell<MinerState>>,
    phase: MiningPhase,
}

impl Process<Signal> for MiningProcess {
    fn resume(&mut self, sched: &mut Scheduler<Signal>, outcome: Outcome<Signal>) -> Step {
        let mut state = self.state.borrow_mut();
        if !state.mining_enabled {
            state.mining_paused = false;
            return Step::Done;
        }

        match outcome {
            Outcome::Started => {}
            Outcome::Fired(_) => {
                if let MiningPhase::Mining { size } = self.phase {
                    state.mine_block(sched, size);
                }
            }
            Outcome::Interrupted => {
                // the attempt in progress is lost
                if state.validating {
                    self.phase = MiningPhase::Paused;
                    state.mining_paused = true;
                    return Step::WaitForAny(vec![state.continue_signal]);
                }
            }
        }

        let (size, wait) = state.draw();
        self.phase = MiningPhase::Mining { size };
        Step::WaitForAny(vec![sched.schedule_after(wait)])
    }
}

enum ValidationPhase {
    Idle,
    Verifying(Rc<Block>, Origin),
}

struct ValidationProcess {
    state: Rc<RefCell<MinerState>>,
    phase: ValidationPhase,
}

impl ValidationProcess {
    fn next(&mut self, sched: &mut Scheduler<Signal>, state: &mut MinerState) -> Step {
        loop {
            while let Some((block, origin)) = state.queue.pop_front() {
                if state.chain.contains(&block.id) || state.chain.is_pending(&block.id) {
                    state.stats.duplicates += 1;
                    continue;
                }
                let delay = block.size / state.config.verify_rate;
                state.verifying = Some(block.id);
                self.phase = ValidationPhase::Verifying(block, origin);
                return Step::WaitForAny(vec![sched.schedule_after(delay)]);
            }

            let late = state.drain_signals(sched);
            if late.is_empty() {
                break;
            }
            state.queue.extend(late);
        }

        state.verifying = None;
        state.validating = false;
        if state.mining_paused {
            state.mining_paused = false;
            sched.succeed(state.continue_signal, Signal::Wake);
            state.continue_signal = sched.event();
        }

        self.phase = ValidationPhase::Idle;
        Step::WaitForAny(vec![state.mined_signal, state.received_signal])
    }
}

impl Process<Signal> for ValidationProcess {
    fn resume(&mut self, sched: &mut Scheduler<Signal>, outcome: Outcome<Signal>) -> Step {
        let state_rc = self.state.clone();
        let mut state = state_rc.borrow_mut();
        let phase = std::mem::replace(&mut self.phase, ValidationPhase::Idle);

        match (phase, outcome) {
            (ValidationPhase::Idle, Outcome::Fired(fired)) => {
                // new blocks: stop mining before touching the chain
                state.validating = true;
                if let Some(pid) = state.mining {
                    sched.interrupt(pid);
                }
                for (condition, _) in fired {
                    state.renew_signal(sched, condition);
                }
                let backlog: Vec<_> = state.backlog.drain(..).collect();
                state.queue.extend(backlog);
            }
            (ValidationPhase::Verifying(block, origin), Outcome::Fired(_)) => {
                state.conclude(sched, block, origin);
            }
            (ValidationPhase::Verifying(block, origin), Outcome::Interrupted) => {
                // verification is never cut short: start it over
                state.queue.push_front((block, origin));
            }
            _ => {}
        }

        self.next(sched, &mut state)
    }
}

struct ReceiveProcess {
    state: Rc<RefCell<MinerState>>,
    inbox: Channel<ProtocolMessage>,
}

impl Process<Signal> for ReceiveProcess {
    fn resume(&mut self, sched: &mut Scheduler<Signal>, outcome: Outcome<Signal>) -> Step {
        if let Outcome::Fired(fired) = outcome {
            let mut state = self.state.borrow_mut();
            for (_, signal) in fired {
                if let Signal::Message(msg) = signal {
                    state.handle_message(sched, msg);
                }
            }
        }
        Step::WaitForAny(vec![self.inbox.receive(sched)])
    }
}

// ============================================================================
// Miner handle
// ============================================================================

pub struct Miner {
    state: Rc<RefCell<MinerState>>,
    inbox: Channel<ProtocolMessage>,
}

impl Miner {
    pub fn new(
        id: MinerId,
        config: MinerConfig,
        genesis: Rc<Block>,
        rng: StdRng,
        sched: &mut Scheduler<Signal>,
        event_sink: SharedSink,
        recorder: SharedRecorder,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let inter_arrival = Exp::new(config.hashrate)
            .map_err(|_| ConfigError::NonPositiveHashrate(config.hashrate))?;

        recorder
            .borrow_mut()
            .record_miner(id, config.hashrate, config.verify_rate);

        let state = MinerState {
            id,
            config,
            inter_arrival,
            rng,
            chain: ChainView::new(id, genesis),
            peers: Vec::new(),
            queue: VecDeque::new(),
            backlog: VecDeque::new(),
            verifying: None,
            validating: false,
            mined_signal: sched.event(),
            received_signal: sched.event(),
            continue_signal: sched.event(),
            mining: None,
            mining_enabled: true,
            mining_paused: false,
            requests: HashMap::new(),
            stats: MinerStats::default(),
            event_sink,
            recorder,
        };

        Ok(Self {
            state: Rc::new(RefCell::new(state)),
            inbox: Channel::new(),
        })
    }

    pub fn id(&self) -> MinerId {
        self.state.borrow().id
    }

    /// Receiving end for every link pointing at this miner
    pub fn inbox(&self) -> &Channel<ProtocolMessage> {
        &self.inbox
    }

    pub fn add_peer(&self, link: Link<ProtocolMessage>) {
        self.state.borrow_mut().peers.push(link);
    }

    pub fn peers(&self) -> Vec<MinerId> {
        self.state
            .borrow()
            .peers
            .iter()
            .map(|link| link.destination)
            .collect()
    }

    pub fn is_linked_to(&self, peer: MinerId) -> bool {
        self.state.borrow().link_to(peer).is_some()
    }

    /// Spawn the validation, receive and mining processes
    pub fn start(&self, sched: &mut Scheduler<Signal>) {
        sched.spawn(Box::new(ValidationProcess {
            state: self.state.clone(),
            phase: ValidationPhase::Idle,
        }));
        sched.spawn(Box::new(ReceiveProcess {
            state: self.state.clone(),
            inbox: self.inbox.clone(),
        }));
        let mining = sched.spawn(Box::new(MiningProcess {
            state: self.state.clone(),
            phase: MiningPhase::Idle,
        }));
        self.state.borrow_mut().mining = Some(mining);
    }

    /// Terminate the mining process. Validation and messaging keep running.
    pub fn stop_mining(&self, sched: &mut Scheduler<Signal>) {
        let mut state = self.state.borrow_mut();
        state.mining_enabled = false;
        if let Some(pid) = state.mining {
            sched.interrupt(pid);
        }
    }

    pub fn is_mining(&self) -> bool {
        self.state.borrow().mining_enabled
    }

    pub fn state(&self) -> Ref<'_, MinerState> {
        self.state.borrow()
    }

    pub fn chain(&self) -> Ref<'_, ChainView> {
        Ref::map(self.state.borrow(), |state| &state.chain)
    }

    pub fn stats(&self) -> MinerStats {
        self.state.borrow().stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mn_events::CollectorEventSink;
    use crate::mn_memory_backend::MemRecorder;
    use rand::SeedableRng;

    struct Fixture {
        sched: Scheduler<Signal>,
        miner: Miner,
        peer_inbox: Channel<ProtocolMessage>,
        events: Rc<RefCell<CollectorEventSink>>,
        recorder: Rc<RefCell<MemRecorder>>,
        genesis: Rc<Block>,
    }

    const ME: MinerId = 1;
    const PEER: MinerId = 2;

    /// One miner with a single outbound link to a passive peer inbox
    fn fixture(config: MinerConfig) -> Fixture {
        let mut sched = Scheduler::new();
        let events = CollectorEventSink::shared();
        let recorder = Rc::new(RefCell::new(MemRecorder::new()));
        let genesis = Rc::new(Block::genesis());

        let miner = Miner::new(
            ME,
            config,
            genesis.clone(),
            StdRng::seed_from_u64(7),
            &mut sched,
            events.clone(),
            recorder.clone(),
        )
        .unwrap();

        let peer_inbox = Channel::new();
        miner.add_peer(Link::new(1, ME, PEER, 1.0, peer_inbox.clone()).unwrap());
        miner.start(&mut sched);

        Fixture {
            sched,
            miner,
            peer_inbox,
            events,
            recorder,
            genesis,
        }
    }

    /// Practically never mines within a test horizon
    fn idle_config() -> MinerConfig {
        MinerConfig::new(1e-12, 1e9)
    }

    fn message(action: Action) -> ProtocolMessage {
        ProtocolMessage {
            destination: ME,
            origin: PEER,
            action,
        }
    }

    fn drain(sched: &mut Scheduler<Signal>, inbox: &Channel<ProtocolMessage>) -> Vec<ProtocolMessage> {
        let mut out = Vec::new();
        while !inbox.is_empty() {
            let condition = inbox.receive(sched);
            if let Some(Signal::Message(msg)) = sched.take(condition) {
                out.push(msg);
            }
        }
        out
    }

    #[test]
    fn test_config_validation() {
        assert_eq!(
            MinerConfig::new(0.0, 1.0).validate(),
            Err(ConfigError::NonPositiveHashrate(0.0))
        );
        assert_eq!(
            MinerConfig::new(1.0, -2.0).validate(),
            Err(ConfigError::NonPositiveVerifyRate(-2.0))
        );
        let mut config = MinerConfig::new(1.0, 1.0);
        config.block_size_range = (10.0, 5.0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBlockSize(10.0, 5.0))
        );
        assert!(MinerConfig::new(0.5 / 600.0, 200.0 * 1024.0).validate().is_ok());
    }

    #[test]
    fn test_construction_records_miner() {
        let f = fixture(idle_config());
        assert_eq!(f.recorder.borrow().miners().count(), 1);
        assert_eq!(f.miner.chain().head(), f.genesis.id);
    }

    #[test]
    fn test_answers_request_for_known_block() {
        let mut f = fixture(idle_config());
        f.miner
            .inbox()
            .put(&mut f.sched, message(Action::RequestBlock(f.genesis.id)));
        f.sched.run_until(5.0);

        let sent = drain(&mut f.sched, &f.peer_inbox);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action, Action::DeliverBlock(f.genesis.clone()));
        assert_eq!(sent[0].destination, PEER);
        assert_eq!(f.miner.stats().responses_sent, 1);
    }

    #[test]
    fn test_delivered_block_is_integrated_and_announced() {
        let mut f = fixture(idle_config());
        let block = Rc::new(Block::new(Some(f.genesis.id), 1, 0.0, PEER, 1000.0));
        f.miner
            .inbox()
            .put(&mut f.sched, message(Action::DeliverBlock(block.clone())));
        f.sched.run_until(5.0);

        assert_eq!(f.miner.chain().head(), block.id);
        let sent = drain(&mut f.sched, &f.peer_inbox);
        assert_eq!(sent, vec![ProtocolMessage {
            destination: PEER,
            origin: ME,
            action: Action::AnnounceHead(block.id),
        }]);
        assert_eq!(f.miner.stats().integrated, 1);
    }

    #[test]
    fn test_orphan_requests_parent_from_sender() {
        let mut f = fixture(idle_config());
        let b1 = Block::new(Some(f.genesis.id), 1, 0.0, PEER, 1000.0);
        let b2 = Rc::new(Block::new(Some(b1.id), 2, 0.0, PEER, 1000.0));
        f.miner
            .inbox()
            .put(&mut f.sched, message(Action::DeliverBlock(b2.clone())));
        f.sched.run_until(5.0);

        assert!(f.miner.chain().is_pending(&b2.id));
        assert_eq!(f.miner.state().outstanding_requests(), 1);
        let sent = drain(&mut f.sched, &f.peer_inbox);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action, Action::RequestBlock(b1.id));

        let needed = f
            .events
            .borrow()
            .events
            .iter()
            .filter(|r| matches!(r.event, Event::DataNeeded { .. }))
            .count();
        assert_eq!(needed, 1);
    }

    #[test]
    fn test_parent_arrival_resolves_orphan() {
        let mut f = fixture(idle_config());
        let b1 = Rc::new(Block::new(Some(f.genesis.id), 1, 0.0, PEER, 1000.0));
        let b2 = Rc::new(Block::new(Some(b1.id), 2, 0.0, PEER, 1000.0));

        f.miner
            .inbox()
            .put(&mut f.sched, message(Action::DeliverBlock(b2.clone())));
        f.sched.run_until(5.0);
        f.miner
            .inbox()
            .put(&mut f.sched, message(Action::DeliverBlock(b1.clone())));
        f.sched.run_until(10.0);

        let chain = f.miner.chain();
        assert_eq!(chain.head(), b2.id);
        assert!(chain.pending_blocks().is_empty());
        assert_eq!(f.miner.state().outstanding_requests(), 0);
    }

    #[test]
    fn test_no_request_for_block_waiting_to_be_verified() {
        let mut f = fixture(MinerConfig::new(1e-12, 1000.0));
        let slow = Rc::new(Block::new(Some(f.genesis.id), 1, 0.0, PEER, 10_000.0));
        let waiting = Rc::new(Block::new(Some(f.genesis.id), 1, 0.5, PEER, 100.0));

        // `slow` keeps the validator busy until t=10
        f.miner
            .inbox()
            .put(&mut f.sched, message(Action::DeliverBlock(slow.clone())));
        f.sched.run_until(1.0);
        f.miner
            .inbox()
            .put(&mut f.sched, message(Action::DeliverBlock(waiting.clone())));
        f.sched.run_until(2.0);
        f.miner
            .inbox()
            .put(&mut f.sched, message(Action::AnnounceHead(waiting.id)));
        f.sched.run_until(30.0);

        assert_eq!(f.events.borrow().requests().count(), 0);
        assert!(f.miner.chain().contains(&waiting.id));
        assert_eq!(f.miner.chain().head(), slow.id);
    }

    #[test]
    fn test_request_retry_after_timeout() {
        let mut config = idle_config();
        config.request_timeout = Some(10.0);
        let mut f = fixture(config);

        for at in [1.0, 5.0, 20.0] {
            f.sched.run_until(at);
            f.miner
                .inbox()
                .put(&mut f.sched, message(Action::AnnounceHead(99)));
        }
        f.sched.run_until(30.0);

        assert_eq!(f.events.borrow().requests().count(), 2);
    }

    #[test]
    fn test_mining_produces_chain() {
        let mut f = fixture(MinerConfig::new(1.0, 1e12));
        f.sched.run_until(50.0);

        let stats = f.miner.stats();
        assert!(stats.mined > 10);
        assert_eq!(stats.integrated, stats.mined);
        assert_eq!(f.miner.chain().height() as usize, stats.mined);
        assert_eq!(f.recorder.borrow().owned_by(&ME).len(), stats.mined);
    }

    #[test]
    fn test_stop_mining() {
        let mut f = fixture(MinerConfig::new(1.0, 1e12));
        f.sched.run_until(20.0);
        f.miner.stop_mining(&mut f.sched);
        f.sched.run_until(21.0);
        let mined = f.miner.stats().mined;

        f.sched.run_until(100.0);
        assert_eq!(f.miner.stats().mined, mined);
        assert!(!f.miner.is_mining());
    }
}

// ============================================================================
// Event Logging System
// ============================================================================

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use log::info;

use crate::mn_interface::{BlockId, MinerId, SimTime};

/// Protocol events emitted by miners for debugging and analysis
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Miner found a new block
    BlockMined { block_id: BlockId, height: u64 },
    /// Miner switched head and told its peers
    HeadAnnounced { block_id: BlockId, height: u64 },
    /// Miner asked for a block it does not have
    BlockRequested {
        block_id: BlockId,
        to: Option<MinerId>,
    },
    /// A peer asked us for a block
    RequestReceived { block_id: BlockId, from: MinerId },
    /// A peer sent us a block
    ResponseReceived { block_id: BlockId, from: MinerId },
    /// A peer announced a new head
    HeadReceived { block_id: BlockId, from: MinerId },
    /// Validated block whose parent is unknown, parked until it arrives
    DataNeeded { block_id: BlockId, parent: BlockId },
    /// Block dropped by validation
    BlockRejected {
        block_id: BlockId,
        reason: &'static str,
    },
}

impl Event {
    pub fn block_id(&self) -> BlockId {
        match self {
            Event::BlockMined { block_id, .. }
            | Event::HeadAnnounced { block_id, .. }
            | Event::BlockRequested { block_id, .. }
            | Event::RequestReceived { block_id, .. }
            | Event::ResponseReceived { block_id, .. }
            | Event::HeadReceived { block_id, .. }
            | Event::DataNeeded { block_id, .. }
            | Event::BlockRejected { block_id, .. } => *block_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::BlockMined { .. } => "NEW_BLOCK",
            Event::HeadAnnounced { .. } => "ANNOUNCE_BLOCK",
            Event::BlockRequested { .. } => "REQUEST",
            Event::RequestReceived { .. } => "BLOCK_REQUEST",
            Event::ResponseReceived { .. } => "BLOCK_RESPONSE",
            Event::HeadReceived { .. } => "HEAD_NEW",
            Event::DataNeeded { .. } => "NEED_DATA",
            Event::BlockRejected { .. } => "REJECTED",
        }
    }
}

/// Trait for consuming events from the miners
pub trait EventSink {
    fn log(&mut self, time: SimTime, miner: MinerId, event: Event);
}

/// One sink shared by every miner of a network, so records keep global order
pub type SharedSink = Rc<RefCell<dyn EventSink>>;

/// No-op event sink (zero overhead)
pub struct NoOpSink;

impl EventSink for NoOpSink {
    #[inline(always)]
    fn log(&mut self, _time: SimTime, _miner: MinerId, _event: Event) {}
}

/// Writes one line per event through the `log` facade
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn log(&mut self, time: SimTime, miner: MinerId, event: Event) {
        info!(
            "#{:7.4}\t\tMiner {}\t\t{:<20}\t{}",
            time,
            miner,
            event.kind(),
            event.block_id()
        );
    }
}

// ============================================================================
// Collector Event Sink (In-Memory)
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub time: SimTime,
    pub miner: MinerId,
    pub event: Event,
}

/// Collects events in memory for programmatic analysis
#[derive(Default)]
pub struct CollectorEventSink {
    pub events: Vec<EventRecord>,
}

impl CollectorEventSink {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn for_miner(&self, miner: MinerId) -> impl Iterator<Item = &EventRecord> {
        self.events.iter().filter(move |e| e.miner == miner)
    }

    pub fn requests(&self) -> impl Iterator<Item = &EventRecord> {
        self.events
            .iter()
            .filter(|e| matches!(e.event, Event::BlockRequested { .. }))
    }

    pub fn mined(&self) -> impl Iterator<Item = &EventRecord> {
        self.events
            .iter()
            .filter(|e| matches!(e.event, Event::BlockMined { .. }))
    }

    pub fn count_by_type(&self) -> EventTypeCounts {
        let mut counts = EventTypeCounts::default();
        for record in &self.events {
            match record.event {
                Event::BlockMined { .. } => counts.mined += 1,
                Event::HeadAnnounced { .. } => counts.announced += 1,
                Event::BlockRequested { .. } => counts.requested += 1,
                Event::RequestReceived { .. } => counts.request_received += 1,
                Event::ResponseReceived { .. } => counts.response_received += 1,
                Event::HeadReceived { .. } => counts.head_received += 1,
                Event::DataNeeded { .. } => counts.data_needed += 1,
                Event::BlockRejected { .. } => counts.rejected += 1,
            }
        }
        counts
    }

    /// Write `time,miner,event_type,block_id,related` rows
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "time,miner,event_type,block_id,related")?;
        for record in &self.events {
            let related = match &record.event {
                Event::BlockMined { height, .. } | Event::HeadAnnounced { height, .. } => {
                    height.to_string()
                }
                Event::BlockRequested { to, .. } => {
                    to.map(|m| m.to_string()).unwrap_or_else(|| "*".to_string())
                }
                Event::RequestReceived { from, .. }
                | Event::ResponseReceived { from, .. }
                | Event::HeadReceived { from, .. } => from.to_string(),
                Event::DataNeeded { parent, .. } => parent.to_string(),
                Event::BlockRejected { reason, .. } => reason.to_string(),
            };
            writeln!(
                writer,
                "{},{},{},{},{}",
                record.time,
                record.miner,
                record.event.kind(),
                record.event.block_id(),
                related
            )?;
        }
        writer.flush()
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct EventTypeCounts {
    pub mined: usize,
    pub announced: usize,
    pub requested: usize,
    pub request_received: usize,
    pub response_received: usize,
    pub head_received: usize,
    pub data_needed: usize,
    pub rejected: usize,
}

impl EventSink for CollectorEventSink {
    fn log(&mut self, time: SimTime, miner: MinerId, event: Event) {
        self.events.push(EventRecord { time, miner, event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_counts() {
        let mut sink = CollectorEventSink::new();
        sink.log(1.0, 1, Event::BlockMined { block_id: 10, height: 1 });
        sink.log(1.0, 1, Event::HeadAnnounced { block_id: 10, height: 1 });
        sink.log(3.0, 2, Event::HeadReceived { block_id: 10, from: 1 });
        sink.log(3.0, 2, Event::BlockRequested { block_id: 10, to: Some(1) });

        let counts = sink.count_by_type();
        assert_eq!(counts.mined, 1);
        assert_eq!(counts.announced, 1);
        assert_eq!(counts.head_received, 1);
        assert_eq!(counts.requested, 1);
        assert_eq!(sink.for_miner(2).count(), 2);
        assert_eq!(sink.requests().next().map(|r| r.miner), Some(2));
    }

    #[test]
    fn test_shared_sink_coerces() {
        let collector = CollectorEventSink::shared();
        let shared: SharedSink = collector.clone();

        shared
            .borrow_mut()
            .log(0.5, 3, Event::DataNeeded { block_id: 4, parent: 5 });

        assert_eq!(collector.borrow().events.len(), 1);
        assert_eq!(collector.borrow().events[0].event.block_id(), 4);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(Event::BlockMined { block_id: 0, height: 0 }.kind(), "NEW_BLOCK");
        assert_eq!(Event::DataNeeded { block_id: 0, parent: 0 }.kind(), "NEED_DATA");
    }
}

//! Event sinks used by the scenario binaries

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use mn_rust::{Event, EventSink, MinerId, SimTime};

// ============================================================================
// Console Logging Sink
// ============================================================================

/// Prints one line per event
pub struct ConsoleEventSink {
    enabled: bool,
}

impl ConsoleEventSink {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl EventSink for ConsoleEventSink {
    fn log(&mut self, time: SimTime, miner: MinerId, event: Event) {
        if !self.enabled {
            return;
        }

        let detail = match &event {
            Event::BlockMined { height, .. } | Event::HeadAnnounced { height, .. } => {
                format!("height:{}", height)
            }
            Event::BlockRequested { to: Some(to), .. } => format!("to:{}", to),
            Event::BlockRequested { to: None, .. } => "to:*".to_string(),
            Event::RequestReceived { from, .. }
            | Event::ResponseReceived { from, .. }
            | Event::HeadReceived { from, .. } => format!("from:{}", from),
            Event::DataNeeded { parent, .. } => format!("parent:{:x}", parent & 0xFFFF),
            Event::BlockRejected { reason, .. } => format!("reason:{}", reason),
        };

        println!(
            "#{:>10.4} {:>4} {:<16} block:{:x} {}",
            time,
            miner,
            event.kind(),
            event.block_id() & 0xFFFF,
            detail
        );
    }
}

// ============================================================================
// CSV Event Sink
// ============================================================================

/// CSV event sink for structured data export
pub struct CsvEventSink {
    writer: BufWriter<File>,
}

impl CsvEventSink {
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "time,miner,event_type,block_id,peer,value")?;

        Ok(Self { writer })
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl EventSink for CsvEventSink {
    fn log(&mut self, time: SimTime, miner: MinerId, event: Event) {
        let kind = event.kind();
        let block = event.block_id();
        let result = match event {
            Event::BlockMined { height, .. } | Event::HeadAnnounced { height, .. } => writeln!(
                self.writer,
                "{},{},{},{},,{}",
                time, miner, kind, block, height
            ),
            Event::BlockRequested { to, .. } => writeln!(
                self.writer,
                "{},{},{},{},{},",
                time,
                miner,
                kind,
                block,
                to.map(|p| p.to_string()).unwrap_or_default()
            ),
            Event::RequestReceived { from, .. }
            | Event::ResponseReceived { from, .. }
            | Event::HeadReceived { from, .. } => writeln!(
                self.writer,
                "{},{},{},{},{},",
                time, miner, kind, block, from
            ),
            Event::DataNeeded { parent, .. } => writeln!(
                self.writer,
                "{},{},{},{},,{}",
                time, miner, kind, block, parent
            ),
            Event::BlockRejected { reason, .. } => writeln!(
                self.writer,
                "{},{},{},{},,{}",
                time, miner, kind, block, reason
            ),
        };

        if let Err(e) = result {
            eprintln!("Error writing to CSV: {}", e);
        }
    }
}

impl Drop for CsvEventSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

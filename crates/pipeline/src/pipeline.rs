//! The batch processing loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use s1scope_codec as codec;
use s1scope_core::{CanonicalMessage, SpoolRecord};
use s1scope_correlate::{Correlator, CorrelatorConfig};
use s1scope_rules::{RuleEngine, Ruleset};
use s1scope_spool::{Spool, SpoolConfig};

use crate::sinks::Sink;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub spool: SpoolConfig,
    pub consumer_group: String,
    pub context_expiry: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            spool: SpoolConfig::default(),
            consumer_group: "default".to_string(),
            context_expiry: Duration::from_secs(300),
        }
    }
}

/// Wires spool, codec, correlator, rule engine and sinks together.
///
/// The correlator is created once here and shared with the rule engine as
/// a lookup handle; everything runs on the thread calling `process_batch`.
pub struct Pipeline {
    config: PipelineConfig,
    spool: Spool,
    correlator: Arc<Correlator>,
    rule_engine: RuleEngine,
    sinks: Vec<Arc<dyn Sink>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let spool = Spool::new(config.spool.clone())?;
        let correlator = Arc::new(Correlator::new(CorrelatorConfig {
            context_expiry: config.context_expiry,
        }));
        let rule_engine = RuleEngine::new(Arc::clone(&correlator));

        Ok(Pipeline {
            config,
            spool,
            correlator,
            rule_engine,
            sinks: Vec::new(),
        })
    }

    pub fn load_ruleset(&mut self, ruleset: Ruleset) {
        self.rule_engine.load_ruleset(ruleset);
    }

    pub fn add_sink(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }

    /// The spool this pipeline reads; ingest adapters append here.
    pub fn spool(&self) -> &Spool {
        &self.spool
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Decode one spool record into a canonical message, stamping the
    /// spool reference and the capture frame number when the transport
    /// metadata carries one.
    pub fn decode_and_normalize(&self, record: &SpoolRecord) -> CanonicalMessage {
        let mut canonical = codec::decode(&record.message.raw_payload);
        canonical.spool_partition = record.partition;
        canonical.spool_offset = record.offset;
        canonical.frame_number = frame_number_from_meta(&record.message.transport_meta);
        canonical
    }

    /// Process up to `max_messages` per partition. Returns the number of
    /// events emitted. Malformed messages never abort the batch.
    pub fn process_batch(&mut self, max_messages: i64) -> usize {
        let mut events_emitted = 0;

        for partition in 0..self.config.spool.num_partitions {
            let offset = self.spool.load_offset(&self.config.consumer_group, partition);
            let high_water = self.spool.high_water_mark(partition);
            if offset > high_water {
                continue;
            }

            let records = match self.spool.read(partition, offset, max_messages) {
                Ok(records) => records,
                Err(e) => {
                    log::warn!("spool read failed on partition {}: {}", partition, e);
                    continue;
                }
            };
            if records.is_empty() {
                continue;
            }

            let mut last_offset = offset - 1;
            for record in &records {
                let canonical = self.decode_and_normalize(record);
                if canonical.decode_failed {
                    log::debug!(
                        "decode failed for partition {} offset {}",
                        record.partition,
                        record.offset
                    );
                }

                let events = self.rule_engine.process(&canonical);
                for event in &events {
                    for sink in &self.sinks {
                        if let Err(e) = sink.emit(event) {
                            log::warn!("sink failed to emit event {}: {}", event.name, e);
                        }
                    }
                    events_emitted += 1;
                }

                last_offset = record.offset;
            }

            if last_offset >= offset {
                // Committed offsets are the next offset to read.
                if let Err(e) =
                    self.spool
                        .commit_offset(&self.config.consumer_group, partition, last_offset + 1)
                {
                    log::warn!("offset commit failed on partition {}: {}", partition, e);
                }
            }
        }

        self.correlator.cleanup_expired();
        self.rule_engine.cleanup_expired_sequences();

        events_emitted
    }

    /// Run until `stop` is set, with a short idle sleep between batches.
    /// Flushes the spool and the sinks on the way out.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::Relaxed) {
            let emitted = self.process_batch(100);
            if emitted == 0 {
                std::thread::sleep(Duration::from_millis(100));
            }
        }
        self.spool.flush()?;
        for sink in &self.sinks {
            if let Err(e) = sink.flush() {
                log::warn!("sink flush failed: {}", e);
            }
        }
        Ok(())
    }
}

/// Frame number from the transport metadata JSON (`packet_num` field),
/// written by PCAP-backed sources.
fn frame_number_from_meta(meta: &str) -> Option<i64> {
    if meta.is_empty() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(meta).ok()?;
    value.get("packet_num")?.as_i64()
}

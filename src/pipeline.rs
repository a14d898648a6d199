/*!
The record-ingest boundary: a bounded hand-off queue between a record source
thread and the single-threaded fold loop, with interval bookkeeping driven
by BGP record time.

Only the fold loop ever touches the engine. The source may block on the
queue when the fold loop falls behind; a shutdown flag lets the current
record complete and the current interval publish (or be discarded, per
configuration) before the loop returns.
*/

use crate::engine::RouteTables;
use crate::error::TablesError;
use crate::models::BgpRecord;
use crate::sink::{MetricsSink, ViewSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

const RECORD_QUEUE_DEPTH: usize = 1024;

/// Anything that can yield decoded BGP records, in order.
pub trait RecordSource: Send {
    fn next_record(&mut self) -> Option<BgpRecord>;
}

impl<I> RecordSource for I
where
    I: Iterator<Item = BgpRecord> + Send,
{
    fn next_record(&mut self) -> Option<BgpRecord> {
        self.next()
    }
}

/// Drives an engine from a record source, closing an interval every
/// `interval_secs` of BGP time.
pub struct Pipeline<'a> {
    engine: &'a mut RouteTables,
    view_sink: &'a mut dyn ViewSink,
    metrics_sink: &'a mut dyn MetricsSink,
    interval_secs: u32,
    shutdown: Arc<AtomicBool>,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        engine: &'a mut RouteTables,
        view_sink: &'a mut dyn ViewSink,
        metrics_sink: &'a mut dyn MetricsSink,
        interval_secs: u32,
    ) -> Self {
        assert!(interval_secs > 0, "interval length must be positive");
        Pipeline {
            engine,
            view_sink,
            metrics_sink,
            interval_secs,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that asks the running pipeline to stop after the record it is
    /// currently folding.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Consume `source` to completion (or until shutdown). The source runs
    /// on its own thread and hands records over through a bounded queue.
    pub fn run<S>(mut self, source: S) -> Result<(), TablesError>
    where
        S: RecordSource + 'static,
    {
        let (tx, rx) = mpsc::sync_channel::<BgpRecord>(RECORD_QUEUE_DEPTH);
        let producer = thread::spawn(move || {
            let mut source = source;
            while let Some(record) = source.next_record() {
                if tx.send(record).is_err() {
                    // the fold loop went away; stop producing
                    break;
                }
            }
        });

        let mut interval_end_time: Option<u32> = None;
        let mut stopped_early = false;
        let mut result = Ok(());

        for record in &rx {
            let t = record.record_time;
            match interval_end_time {
                None => {
                    let start = t - (t % self.interval_secs);
                    self.engine.interval_start(start);
                    interval_end_time = Some(start + self.interval_secs);
                }
                Some(end) => {
                    let mut end = end;
                    while t >= end {
                        self.engine.interval_end(
                            end,
                            Some(&mut *self.view_sink),
                            Some(&mut *self.metrics_sink),
                        );
                        self.engine.interval_start(end);
                        end += self.interval_secs;
                    }
                    interval_end_time = Some(end);
                }
            }

            if let Err(e) = self.engine.process_record(&record) {
                result = Err(e);
                stopped_early = true;
                break;
            }

            if self.shutdown.load(Ordering::Relaxed) {
                stopped_early = true;
                break;
            }
        }

        // dropping the receiver unblocks a producer stuck on a full queue
        drop(rx);
        let _ = producer.join();

        if let Some(end) = interval_end_time {
            let publish = result.is_ok()
                && (!stopped_early || self.engine.config().publish_on_shutdown);
            if publish {
                self.engine.interval_end(
                    end,
                    Some(&mut *self.view_sink),
                    Some(&mut *self.metrics_sink),
                );
            }
        }

        result
    }
}

//! Ring-buffered visualization sink for bounded retrospective display

use crate::log::VisualizationSink;
use neurodaq_core::RingBuffer;

/// Keeps the most recent N values of every visualization stream, plus
/// the pass counters they arrived with
pub struct ScopeSink {
    stream_names: Vec<String>,
    history: Vec<RingBuffer<f64>>,
    counters: RingBuffer<u32>,
    depth: usize,
}

impl ScopeSink {
    /// `depth` is the number of passes of history kept per stream
    pub fn new(stream_names: Vec<String>, depth: usize) -> Self {
        let history = stream_names
            .iter()
            .map(|_| RingBuffer::new(depth))
            .collect();
        ScopeSink {
            stream_names,
            history,
            counters: RingBuffer::new(depth),
            depth,
        }
    }

    pub fn stream_names(&self) -> &[String] {
        &self.stream_names
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// History of one stream, oldest pass first
    pub fn stream_history(&self, index: usize) -> Option<Vec<f64>> {
        self.history.get(index).map(RingBuffer::ordered)
    }

    /// Pass counters matching the stream history
    pub fn counter_history(&self) -> Vec<u32> {
        self.counters.ordered()
    }

    /// Most recent value of one stream
    pub fn latest(&self, index: usize) -> Option<f64> {
        self.history.get(index).and_then(RingBuffer::latest)
    }

    pub fn clear(&mut self) {
        for buf in &mut self.history {
            buf.clear();
        }
        self.counters.clear();
    }
}

impl VisualizationSink for ScopeSink {
    fn on_pass(&mut self, counter: u32, values: &[f64]) {
        // The telemetry log has already verified the value count
        for (buf, value) in self.history.iter_mut().zip(values) {
            buf.push(*value);
        }
        self.counters.push(counter);
    }
}

//! Channel output — backpressure queue and per-channel post-processing
//!
//! Decouples the high-rate channelizer thread from each channel's slower
//! demodulation task. The boundary is a fixed-capacity queue with an
//! explicit non-blocking overflow policy: when the consumer falls behind,
//! newly submitted blocks are refused (drop-newest) and an edge-triggered
//! listener is told the channel entered overflow. The producer is radio
//! hardware and can never be throttled, so sustained overflow degrades one
//! channel's fidelity instead of blocking the device feed.
//!
//! [`ChannelOutputProcessor`] owns one queue plus the per-channel
//! post-processing chain: optional frequency correction against a local
//! oscillator, fixed gain, and reassembly into fixed-size output blocks
//! for the demodulator. A failure while processing one drained block is
//! logged and skipped; later blocks are unaffected.

use crate::gain::ComplexGain;
use crate::mixer::ComplexMixer;
use crate::types::{ComplexSamples, DspResult};
use crate::vector::Implementation;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Callbacks for queue overflow state transitions.
///
/// Both methods fire exactly once per transition and are invoked while the
/// queue lock is held; implementations must not call back into the queue.
pub trait OverflowListener: Send {
    /// The queue refused its first submission since last running normally.
    fn overflow_entered(&mut self);
    /// A drain brought occupancy back below the recovery threshold.
    fn overflow_cleared(&mut self);
}

struct QueueState<T> {
    items: VecDeque<T>,
    overflow: bool,
    listener: Option<Box<dyn OverflowListener>>,
}

/// Bounded FIFO queue with drop-newest overflow and edge-triggered
/// notifications.
///
/// `submit` and `drain` never block beyond the internal lock; neither has
/// a waiting path. FIFO order holds for every item that was accepted.
pub struct OverflowableTransferQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    reset_threshold: usize,
    dropped: AtomicU64,
}

impl<T> OverflowableTransferQueue<T> {
    /// Create a queue holding at most `capacity` items, clearing overflow
    /// once a drain brings occupancy below `reset_threshold`.
    pub fn new(capacity: usize, reset_threshold: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                overflow: false,
                listener: None,
            }),
            capacity: capacity.max(1),
            reset_threshold: reset_threshold.min(capacity).max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register the overflow listener, replacing any previous one.
    pub fn set_listener(&self, listener: Box<dyn OverflowListener>) {
        self.state.lock().expect("queue lock poisoned").listener = Some(listener);
    }

    /// Offer one item. Returns false when the queue is full; the item is
    /// refused rather than evicting older data.
    pub fn submit(&self, item: T) -> bool {
        let mut state = self.state.lock().expect("queue lock poisoned");
        if state.items.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            if !state.overflow {
                state.overflow = true;
                if let Some(listener) = state.listener.as_mut() {
                    listener.overflow_entered();
                }
            }
            return false;
        }
        state.items.push_back(item);
        true
    }

    /// Remove and return up to `max_items` items in FIFO order, possibly
    /// none.
    pub fn drain(&self, max_items: usize) -> Vec<T> {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let count = max_items.min(state.items.len());
        let drained: Vec<T> = state.items.drain(..count).collect();

        if state.overflow && state.items.len() < self.reset_threshold {
            state.overflow = false;
            if let Some(listener) = state.listener.as_mut() {
                listener.overflow_cleared();
            }
        }
        drained
    }

    /// Discard all queued items without firing listeners.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("queue lock poisoned");
        state.items.clear();
        state.overflow = false;
    }

    /// Current occupancy.
    pub fn len(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").items.len()
    }

    /// True when no items are queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total submissions refused since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Reassembles variable-length processed blocks into fixed-size output
/// blocks for the demodulator.
pub struct SamplesAssembler {
    block_size: usize,
    i: Vec<f32>,
    q: Vec<f32>,
    timestamp: u64,
    listener: Option<Box<dyn FnMut(ComplexSamples) + Send>>,
}

impl SamplesAssembler {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
            i: Vec::new(),
            q: Vec::new(),
            timestamp: 0,
            listener: None,
        }
    }

    /// Register the completed-block listener, replacing any previous one.
    pub fn set_listener(&mut self, listener: Box<dyn FnMut(ComplexSamples) + Send>) {
        self.listener = Some(listener);
    }

    /// Append one processed block, emitting completed output blocks as
    /// they fill. An emitted block carries the timestamp of the first
    /// contributing input block.
    pub fn receive(&mut self, samples: ComplexSamples) {
        if self.i.is_empty() {
            self.timestamp = samples.timestamp;
        }
        self.i.extend_from_slice(&samples.i);
        self.q.extend_from_slice(&samples.q);

        while self.i.len() >= self.block_size {
            let i: Vec<f32> = self.i.drain(..self.block_size).collect();
            let q: Vec<f32> = self.q.drain(..self.block_size).collect();
            let block = ComplexSamples::new(i, q, self.timestamp);
            self.timestamp = samples.timestamp;
            if let Some(listener) = self.listener.as_mut() {
                listener(block);
            }
        }
    }

    /// Discard any partial block.
    pub fn reset(&mut self) {
        self.i.clear();
        self.q.clear();
    }
}

/// Per-channel output stage: bounded queue, optional frequency correction,
/// gain, and block reassembly.
///
/// The mixer and gain run the scalar kernels regardless of calibration
/// because drained block lengths vary with channelizer load and are not
/// guaranteed to be lane multiples.
pub struct ChannelOutputProcessor {
    queue: Arc<OverflowableTransferQueue<ComplexSamples>>,
    mixer: Option<ComplexMixer>,
    sample_rate: f64,
    gain: ComplexGain,
    assembler: SamplesAssembler,
    max_results: usize,
}

impl ChannelOutputProcessor {
    /// Create a processor for one channel.
    ///
    /// Queue capacity covers roughly three seconds of blocks at the
    /// channel sample rate with recovery at roughly half a second; each
    /// `process` call handles at most two tenths of a second of blocks so
    /// one slow channel cannot monopolize the consumer thread.
    pub fn new(
        sample_rate: f64,
        frequency_offset: f64,
        gain: f32,
        output_block_size: usize,
    ) -> DspResult<Self> {
        let capacity = (sample_rate * 3.0) as usize;
        let reset_threshold = (sample_rate * 0.5) as usize;
        let max_results = (sample_rate / 10.0) as usize * 2;

        let mixer = if frequency_offset != 0.0 {
            Some(ComplexMixer::new(frequency_offset, sample_rate, Implementation::Scalar)?)
        } else {
            None
        };

        Ok(Self {
            queue: Arc::new(OverflowableTransferQueue::new(capacity, reset_threshold)),
            mixer,
            sample_rate,
            gain: ComplexGain::new(gain, Implementation::Scalar),
            assembler: SamplesAssembler::new(output_block_size),
            max_results: max_results.max(1),
        })
    }

    /// Shared handle to the queue for the producer side.
    pub fn queue(&self) -> Arc<OverflowableTransferQueue<ComplexSamples>> {
        Arc::clone(&self.queue)
    }

    /// Offer one block from the producer. Never blocks; returns false when
    /// the block was refused under overflow.
    pub fn submit(&self, samples: ComplexSamples) -> bool {
        self.queue.submit(samples)
    }

    /// Register the completed-output-block listener.
    pub fn set_listener(&mut self, listener: Box<dyn FnMut(ComplexSamples) + Send>) {
        self.assembler.set_listener(listener);
    }

    /// Register the overflow listener.
    pub fn set_overflow_listener(&self, listener: Box<dyn OverflowListener>) {
        self.queue.set_listener(listener);
    }

    /// Retune the per-channel frequency correction. A zero offset removes
    /// the mixer so the multiply is skipped entirely.
    pub fn set_frequency_offset(&mut self, frequency_offset: f64) -> DspResult<()> {
        if frequency_offset == 0.0 {
            self.mixer = None;
        } else {
            match self.mixer.as_mut() {
                Some(mixer) => mixer.set_frequency(frequency_offset),
                None => {
                    self.mixer = Some(ComplexMixer::new(
                        frequency_offset,
                        self.sample_rate,
                        Implementation::Scalar,
                    )?);
                }
            }
        }
        Ok(())
    }

    /// Drain and process one batch of queued blocks. Returns the number of
    /// blocks successfully processed; blocks that fail are logged and
    /// skipped without affecting the rest of the batch.
    pub fn process(&mut self) -> usize {
        let blocks = self.queue.drain(self.max_results);
        let mut processed = 0;

        for block in blocks {
            match self.process_block(block) {
                Ok(output) => {
                    self.assembler.receive(output);
                    processed += 1;
                }
                Err(error) => {
                    tracing::error!(%error, "discarding channel output block");
                }
            }
        }
        processed
    }

    fn process_block(&mut self, block: ComplexSamples) -> DspResult<ComplexSamples> {
        let corrected = match self.mixer.as_mut() {
            Some(mixer) => mixer.mix(&block)?,
            None => block,
        };
        self.gain.apply(&corrected)
    }

    /// Detach the channel: discard queued work and any partial output
    /// block. Blocks already drained before this call complete normally.
    pub fn dispose(&mut self) {
        self.queue.clear();
        self.assembler.reset();
    }
}

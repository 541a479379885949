//! Bounded, order-preserving input queue with demand accounting.
//!
//! Every linked input pad owns an [`InputBuffer`]. Producers append caps,
//! events and buffer batches in emission order; the demand handler drains
//! from the head, never past the element's current demand. On pull links
//! the queue keeps itself filled up to `preferred_size` by re-demanding the
//! deficit from the peer after every drain; on push links no demand is
//! issued and the toilet does the guarding instead.

use crate::buffer::Buffer;
use crate::element::{DemandUnit, PadRef};
use crate::event::Event;
use crate::format::Caps;
use crate::message::{Mailbox, Message};
use std::collections::VecDeque;

/// Default number of units an input buffer keeps queued or on order.
pub const DEFAULT_PREFERRED_SIZE: u64 = 40;

/// Settings for one input buffer.
#[derive(Debug, Clone, Copy)]
pub struct InputBufferConfig {
    /// Watermark the queue refills itself to (queued + outstanding).
    pub preferred_size: u64,
}

impl Default for InputBufferConfig {
    fn default() -> Self {
        Self {
            preferred_size: DEFAULT_PREFERRED_SIZE,
        }
    }
}

/// One queued stream item.
#[derive(Debug, Clone)]
pub(crate) enum Item {
    /// Stream format descriptor.
    Caps(Caps),
    /// In-band event.
    Event(Event),
    /// A batch of buffers with its measured size.
    Buffers { buffers: Vec<Buffer>, size: u64 },
}

/// Outcome of a drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TakeStatus {
    /// The requested amount was delivered.
    Drained,
    /// The queue ran dry before the demand was satisfied.
    Empty,
}

/// Ordered queue of stream items for one input pad.
#[derive(Debug)]
pub(crate) struct InputBuffer {
    queue: VecDeque<Item>,
    /// Buffer units currently queued.
    queued: u64,
    /// Units demanded from the peer that have not arrived yet.
    outstanding: u64,
    preferred_size: u64,
    unit: DemandUnit,
}

impl InputBuffer {
    pub fn new(unit: DemandUnit, config: InputBufferConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            queued: 0,
            outstanding: 0,
            preferred_size: config.preferred_size,
            unit,
        }
    }

    /// Append caps to the queue.
    pub fn store_caps(&mut self, caps: Caps) {
        self.queue.push_back(Item::Caps(caps));
    }

    /// Append an event to the queue.
    pub fn store_event(&mut self, event: Event) {
        self.queue.push_back(Item::Event(event));
    }

    /// Append a batch of buffers, measuring it in the pad's demand unit.
    pub fn store_buffers(&mut self, buffers: Vec<Buffer>) {
        let size = self.unit.measure(&buffers);
        self.queued += size;
        self.outstanding = self.outstanding.saturating_sub(size);
        self.queue.push_back(Item::Buffers { buffers, size });
    }

    /// Drain items from the head until the queue is empty or `demand`
    /// buffer units were taken. Caps and events at the head always drain
    /// and are free of charge. Buffer batches are split at buffer
    /// granularity so the drain never runs meaningfully past the demand
    /// (a byte-counted drain may overshoot within the last buffer).
    ///
    /// When `demand_peer` is given (pull links) and the queue sits below
    /// `preferred_size` afterwards, the deficit is demanded from the peer.
    pub fn take_and_demand(
        &mut self,
        demand: u64,
        demand_peer: Option<(&Mailbox, &PadRef)>,
    ) -> (TakeStatus, Vec<Item>) {
        let mut out = Vec::new();
        let mut taken: u64 = 0;
        let status = loop {
            if taken >= demand {
                break TakeStatus::Drained;
            }
            match self.queue.pop_front() {
                None => break TakeStatus::Empty,
                Some(Item::Caps(caps)) => out.push(Item::Caps(caps)),
                Some(Item::Event(event)) => out.push(Item::Event(event)),
                Some(Item::Buffers { mut buffers, size }) => {
                    let need = demand - taken;
                    if size <= need {
                        self.queued -= size;
                        taken += size;
                        out.push(Item::Buffers { buffers, size });
                    } else {
                        // Split the batch: take whole buffers until the
                        // demand is covered, push the rest back.
                        let mut taken_size = 0;
                        let mut head = Vec::new();
                        while taken_size < need {
                            let buffer = buffers.remove(0);
                            taken_size += self.unit.measure_one(&buffer);
                            head.push(buffer);
                        }
                        if !buffers.is_empty() {
                            self.queue.push_front(Item::Buffers {
                                buffers,
                                size: size - taken_size,
                            });
                        }
                        self.queued -= taken_size;
                        taken += taken_size;
                        out.push(Item::Buffers {
                            buffers: head,
                            size: taken_size,
                        });
                    }
                }
            }
        };
        if let Some((peer, peer_pad)) = demand_peer {
            self.demand_deficit(peer, peer_pad);
        }
        (status, out)
    }

    /// Demand whatever is missing up to the watermark. Used after drains
    /// and once when the pad goes live.
    pub fn demand_deficit(&mut self, peer: &Mailbox, peer_pad: &PadRef) {
        let level = self.queued + self.outstanding;
        if level < self.preferred_size {
            let deficit = self.preferred_size - level;
            self.outstanding += deficit;
            peer.send(Message::Demand {
                pad: peer_pad.clone(),
                size: deficit,
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Buffer units currently queued.
    pub fn queued(&self) -> u64 {
        self.queued
    }
}

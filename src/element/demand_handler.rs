//! The demand/supply machinery of an element.
//!
//! `supply_demand` drains an input queue and feeds the drained items to
//! the stream controllers. A drain must never be entered while another is
//! in flight — interleaving two drains could reorder buffers — so
//! re-entrant requests are parked in `delayed_demands` and executed after
//! the running drain finishes. The delayed set is drained in uniformly
//! random order: a fixed iteration order would starve pads under sustained
//! asymmetric pressure.

use crate::element::actor::ElementCore;
use crate::element::input_buffer::Item;
use crate::element::{DemandSize, PadDirection, PadMode, PadRef};
use crate::error::{Error, Result};
use rand::Rng;

/// What a parked demand request will do when executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DelayedDemand {
    /// Drain the pad's input queue.
    Supply,
    /// Re-invoke `handle_demand` for the pad.
    Redemand,
}

impl ElementCore {
    /// Change an input pad's demand (optionally) and supply it.
    ///
    /// If a supply is already running the request is parked; the demand
    /// change itself is applied immediately either way.
    pub(crate) fn supply_demand(
        &mut self,
        pad: PadRef,
        size: Option<DemandSize>,
    ) -> Result<()> {
        if let Some(size) = size {
            self.apply_demand_size(&pad, size)?;
        }
        if self.supplying_demand {
            self.delayed_demands.insert((pad, DelayedDemand::Supply));
            return Ok(());
        }
        self.supplying_demand = true;
        let result = self.do_supply(&pad);
        self.supplying_demand = false;
        result?;
        self.drain_delayed_demands()
    }

    /// Re-enter demand handling for a pad.
    ///
    /// Output pads re-invoke the element's `handle_demand` so it can emit
    /// more buffers; input pads re-drain their queue. Parked while a
    /// supply is in flight.
    pub(crate) fn handle_redemand(&mut self, pad: PadRef) -> Result<()> {
        let direction = self.pads.get(&pad)?.direction();
        match direction {
            PadDirection::Output => {
                if self.supplying_demand {
                    self.delayed_demands.insert((pad, DelayedDemand::Redemand));
                    return Ok(());
                }
                self.invoke_handle_demand(&pad)?;
                self.drain_delayed_demands()
            }
            PadDirection::Input => self.supply_demand(pad, None),
        }
    }

    /// Execute parked demand work until none is left, picking uniformly at
    /// random among the pending entries. Entries parked while one executes
    /// are folded into the next pick.
    fn drain_delayed_demands(&mut self) -> Result<()> {
        if self.draining_delayed {
            return Ok(());
        }
        self.draining_delayed = true;
        let result = (|| {
            while !self.delayed_demands.is_empty() {
                let index = self.rng.gen_range(0..self.delayed_demands.len());
                let entry = self
                    .delayed_demands
                    .iter()
                    .nth(index)
                    .cloned()
                    .expect("index in range");
                self.delayed_demands.remove(&entry);
                let (pad, action) = entry;
                match action {
                    DelayedDemand::Supply => self.supply_demand(pad, None)?,
                    DelayedDemand::Redemand => self.handle_redemand(pad)?,
                }
            }
            Ok(())
        })();
        self.draining_delayed = false;
        result
    }

    /// Apply a demand action to an input pad. Driving the demand below
    /// zero is a contract violation.
    pub(crate) fn apply_demand_size(&mut self, pad: &PadRef, size: DemandSize) -> Result<()> {
        let name = self.name.to_string();
        let data = self.pads.get_mut(pad)?;
        if data.direction() != PadDirection::Input {
            return Err(Error::contract(
                name,
                format!("demand action on output pad `{pad}`; use redemand instead"),
            ));
        }
        match size {
            DemandSize::Exact(value) => data.demand = value,
            DemandSize::Relative(delta) => {
                if delta >= 0 {
                    data.demand = data.demand.saturating_add(delta as u64);
                } else {
                    let decrease = delta.unsigned_abs();
                    data.demand = data.demand.checked_sub(decrease).ok_or_else(|| {
                        Error::contract(
                            name,
                            format!(
                                "demand on pad `{pad}` would become negative \
                                 ({} - {decrease})",
                                data.demand
                            ),
                        )
                    })?;
                }
            }
        }
        Ok(())
    }

    /// One drain pass over a pull input pad: take up to the current demand
    /// from the queue, re-demand the deficit from the peer, and dispatch
    /// the drained items.
    fn do_supply(&mut self, pad: &PadRef) -> Result<()> {
        let items = {
            let data = self.pads.get_mut(pad)?;
            let demand = data.demand;
            let mode = data.mode;
            let Some(peer) = data.peer.clone() else {
                return Ok(());
            };
            let Some(input) = data.input.as_mut() else {
                return Ok(());
            };
            if demand == 0 && input.is_empty() {
                return Ok(());
            }
            // Only pull links re-demand the deficit; push links are fed at
            // the producer's pace and guarded by the toilet.
            let demand_peer = match mode {
                PadMode::Pull => Some((&peer.mailbox, &peer.pad)),
                PadMode::Push => None,
            };
            let (_, items) = input.take_and_demand(demand, demand_peer);
            items
        };
        self.dispatch_items(pad, items)
    }

    /// Flush everything queued on a push input pad, crediting the toilet
    /// for what was drained.
    pub(crate) fn drain_push_pad(&mut self, pad: PadRef) -> Result<()> {
        let items = {
            let data = self.pads.get_mut(&pad)?;
            let Some(input) = data.input.as_mut() else {
                return Ok(());
            };
            let (_, items) = input.take_and_demand(u64::MAX, None);
            items
        };
        self.dispatch_items(&pad, items)
    }

    /// Route drained items to their controllers in queue order, keeping the
    /// demand and toilet accounting in step.
    fn dispatch_items(&mut self, pad: &PadRef, items: Vec<Item>) -> Result<()> {
        for item in items {
            match item {
                Item::Caps(caps) => self.exec_caps_controller(pad, caps)?,
                Item::Event(event) => self.exec_event_controller(pad, event)?,
                Item::Buffers { buffers, size } => {
                    let data = self.pads.get_mut(pad)?;
                    data.demand = data.demand.saturating_sub(size);
                    if data.mode == PadMode::Push {
                        if let Some(toilet) = &data.toilet {
                            toilet.subtract(size);
                        }
                    }
                    self.exec_buffer_controller(pad, buffers)?;
                }
            }
        }
        Ok(())
    }
}

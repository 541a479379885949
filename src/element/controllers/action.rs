//! The action interpreter.
//!
//! Actions returned by a callback are executed strictly in list order.
//! Outgoing stream items are validated against the pad contract here:
//! caps before buffers, start-of-stream before the first buffer, nothing
//! after end-of-stream, and the demand/toilet accounting for the link
//! mode.

use crate::buffer::Buffer;
use crate::element::actor::ElementCore;
use crate::element::controllers::Forwardable;
use crate::element::pad_model::Peer;
use crate::element::{Action, Actions, PadDirection, PadMode, PadRef};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::format::Caps;
use crate::message::Message;

impl ElementCore {
    /// Interpret a callback's actions in order.
    ///
    /// `forwardable` carries the stream item that triggered the callback,
    /// if any, so `Forward` can re-emit it.
    pub(crate) fn process_actions(
        &mut self,
        actions: Actions,
        forwardable: Option<(&PadRef, &Forwardable)>,
    ) -> Result<()> {
        for action in actions {
            match action {
                Action::Caps { pad, caps } => self.send_caps(&pad, caps)?,
                Action::Buffer { pad, buffers } => self.send_buffers(&pad, buffers)?,
                Action::Event { pad, event } => self.send_event(&pad, event)?,
                Action::Demand { pad, size } => self.supply_demand(pad, Some(size))?,
                Action::Redemand { pad } => self.handle_redemand(pad)?,
                Action::Forward => self.forward(forwardable, None)?,
                Action::ForwardTo { pads } => self.forward(forwardable, Some(pads))?,
                Action::Notify(payload) => self.parent.send(Message::Notification {
                    child: self.name.to_string(),
                    payload,
                }),
                Action::PlaybackChangeSuccessful => self.complete_playback_change()?,
                Action::StartTimer { timer, interval } => self.start_timer(timer, interval),
                Action::StopTimer { timer } => self.stop_timer(&timer),
            }
        }
        Ok(())
    }

    /// Negotiate caps on an output pad and send them to the peer.
    pub(crate) fn send_caps(&mut self, pad: &PadRef, caps: Caps) -> Result<()> {
        let name = self.name.to_string();
        let peer = {
            let data = self.pads.get_mut(pad)?;
            if data.direction() != PadDirection::Output {
                return Err(Error::contract(
                    name,
                    format!("caps action on input pad `{pad}`"),
                ));
            }
            if !data.spec.caps.accepts(&caps) {
                return Err(Error::contract(
                    name,
                    format!("caps `{caps}` do not match the constraint declared on pad `{pad}`"),
                ));
            }
            data.caps = Some(caps.clone());
            data.caps_sent = true;
            data.linked_peer(&name, pad)?.clone()
        };
        peer.mailbox.send(Message::Caps {
            pad: peer.pad,
            caps,
        });
        Ok(())
    }

    /// Send buffers on an output pad, spending demand (pull) or filling the
    /// peer's toilet (push). The first buffer implicitly opens the stream.
    pub(crate) fn send_buffers(&mut self, pad: &PadRef, buffers: Vec<Buffer>) -> Result<()> {
        let name = self.name.to_string();
        let (peer, start_of_stream) = {
            let data = self.pads.get_mut(pad)?;
            if data.direction() != PadDirection::Output {
                return Err(Error::contract(
                    name,
                    format!("buffer action on input pad `{pad}`"),
                ));
            }
            if !data.caps_sent {
                return Err(Error::contract(
                    name,
                    format!("cannot send buffer on pad `{pad}`: caps were not sent on it"),
                ));
            }
            if data.end_of_stream {
                return Err(Error::contract(
                    name,
                    format!("cannot send buffer on pad `{pad}` after end_of_stream"),
                ));
            }
            let start_of_stream = if data.start_of_stream {
                false
            } else {
                data.start_of_stream = true;
                true
            };

            let size = data.unit.measure(&buffers);
            match data.mode {
                PadMode::Pull => {
                    data.demand = data.demand.checked_sub(size).ok_or_else(|| {
                        Error::contract(
                            name.clone(),
                            format!(
                                "demand exceeded on pad `{pad}`: tried to send {size} units \
                                 with {} demanded",
                                data.demand
                            ),
                        )
                    })?;
                }
                PadMode::Push => {
                    if let Some(toilet) = &data.toilet {
                        if let Err(new_size) = toilet.add(size) {
                            let capacity = toilet.capacity();
                            tracing::error!(
                                element = %name,
                                pad = %pad,
                                size = new_size,
                                capacity,
                                "toilet overflow: consumer is not keeping up, \
                                 killing the producer"
                            );
                            return Err(Error::ToiletOverflow {
                                element: name,
                                pad: pad.clone(),
                                size: new_size,
                                capacity,
                            });
                        }
                    }
                }
            }
            (data.linked_peer(&name, pad)?.clone(), start_of_stream)
        };

        if start_of_stream {
            peer.mailbox.send(Message::Event {
                pad: peer.pad.clone(),
                event: Event::StartOfStream,
            });
        }
        peer.mailbox.send(Message::Buffers {
            pad: peer.pad,
            buffers,
        });
        Ok(())
    }

    /// Send an event on an output pad, keeping the stream boundary flags.
    pub(crate) fn send_event(&mut self, pad: &PadRef, event: Event) -> Result<()> {
        let name = self.name.to_string();
        let peer = {
            let data = self.pads.get_mut(pad)?;
            if data.direction() != PadDirection::Output {
                return Err(Error::contract(
                    name,
                    format!("event action on input pad `{pad}`"),
                ));
            }
            match &event {
                Event::StartOfStream => {
                    if data.start_of_stream {
                        return Err(Error::contract(
                            name,
                            format!("duplicate start_of_stream on pad `{pad}`"),
                        ));
                    }
                    data.start_of_stream = true;
                }
                Event::EndOfStream => {
                    if data.end_of_stream {
                        return Err(Error::contract(
                            name,
                            format!("duplicate end_of_stream on pad `{pad}`"),
                        ));
                    }
                    data.end_of_stream = true;
                }
                Event::Custom { .. } => {}
            }
            data.linked_peer(&name, pad)?.clone()
        };
        peer.mailbox.send(Message::Event {
            pad: peer.pad,
            event,
        });
        Ok(())
    }

    /// Re-emit the in-flight stream item, either on every linked pad of
    /// the opposite direction or on an explicit list of pads.
    fn forward(
        &mut self,
        forwardable: Option<(&PadRef, &Forwardable)>,
        targets: Option<Vec<PadRef>>,
    ) -> Result<()> {
        let Some((source, item)) = forwardable else {
            tracing::warn!(
                element = %self.name,
                "forward action outside a stream callback; ignoring"
            );
            return Ok(());
        };
        let targets = match targets {
            Some(targets) => targets,
            None => {
                let direction = self.pads.get(source)?.direction().opposite();
                self.pads.linked_refs(direction)
            }
        };
        for target in targets {
            match item {
                Forwardable::Caps(caps) => self.send_caps(&target, caps.clone())?,
                Forwardable::Event(event) => self.send_event(&target, event.clone())?,
                Forwardable::Buffers(buffers) => self.send_buffers(&target, buffers.clone())?,
            }
        }
        Ok(())
    }
}

impl crate::element::pad_model::PadData {
    /// The peer of a linked pad; a stream action on an unlinked pad is a
    /// contract violation.
    fn linked_peer(&self, element: &str, pad: &PadRef) -> Result<&Peer> {
        self.peer.as_ref().ok_or_else(|| {
            Error::contract(element, format!("stream action on unlinked pad `{pad}`"))
        })
    }
}

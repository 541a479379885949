//! Event controller: stream boundary bookkeeping and `handle_event`.

use crate::element::actor::ElementCore;
use crate::element::controllers::Forwardable;
use crate::element::PadRef;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::message::Message;

impl ElementCore {
    /// Dispatch an event drained from an input queue.
    ///
    /// `StartOfStream` and `EndOfStream` set the pad flags and inform the
    /// parent before the element callback runs; `EndOfStream` additionally
    /// disables further buffers on the pad (enforced by the buffer
    /// controller against the flag set here).
    pub(crate) fn exec_event_controller(&mut self, pad: &PadRef, event: Event) -> Result<()> {
        let name = self.name.to_string();
        match &event {
            Event::StartOfStream => {
                let data = self.pads.get_mut(pad)?;
                if data.start_of_stream {
                    return Err(Error::contract(
                        name.clone(),
                        format!("duplicate start_of_stream on pad `{pad}`"),
                    ));
                }
                data.start_of_stream = true;
                self.parent.send(Message::StartOfStream {
                    child: name,
                    pad: pad.clone(),
                });
            }
            Event::EndOfStream => {
                let data = self.pads.get_mut(pad)?;
                if data.end_of_stream {
                    return Err(Error::contract(
                        name.clone(),
                        format!("duplicate end_of_stream on pad `{pad}`"),
                    ));
                }
                data.end_of_stream = true;
                self.parent.send(Message::EndOfStream {
                    child: name,
                    pad: pad.clone(),
                });
            }
            Event::Custom { .. } => {}
        }
        let ctx = self.context();
        let result = self.element.handle_event(pad, &event, &ctx);
        self.interpret(
            "handle_event",
            result,
            Some((pad, &Forwardable::Event(event))),
        )
    }
}

//! Buffer controller: the caps-before-buffer contract and `handle_process`.

use crate::buffer::Buffer;
use crate::element::actor::ElementCore;
use crate::element::controllers::Forwardable;
use crate::element::PadRef;
use crate::error::{Error, Result};

impl ElementCore {
    /// Dispatch buffers drained from an input queue.
    pub(crate) fn exec_buffer_controller(
        &mut self,
        pad: &PadRef,
        buffers: Vec<Buffer>,
    ) -> Result<()> {
        {
            let name = self.name.to_string();
            let data = self.pads.get(pad)?;
            if data.caps.is_none() {
                return Err(Error::contract(
                    name,
                    format!("buffer arrived on pad `{pad}` but caps were not sent on it"),
                ));
            }
            if data.end_of_stream {
                return Err(Error::contract(
                    name,
                    format!("buffer arrived on pad `{pad}` after end_of_stream"),
                ));
            }
        }
        let ctx = self.context();
        let result = self.element.handle_process(pad, buffers.clone(), &ctx);
        self.interpret(
            "handle_process",
            result,
            Some((pad, &Forwardable::Buffers(buffers))),
        )
    }
}

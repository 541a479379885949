//! Caps controller: constraint check, pad update, `handle_caps`.

use crate::element::actor::ElementCore;
use crate::element::controllers::Forwardable;
use crate::element::PadRef;
use crate::error::{Error, Result};
use crate::format::Caps;

impl ElementCore {
    /// Dispatch caps drained from an input queue.
    pub(crate) fn exec_caps_controller(&mut self, pad: &PadRef, caps: Caps) -> Result<()> {
        {
            let name = self.name.to_string();
            let data = self.pads.get_mut(pad)?;
            if !data.spec.caps.accepts(&caps) {
                return Err(Error::contract(
                    name,
                    format!(
                        "caps `{caps}` do not match the constraint declared on pad `{pad}`"
                    ),
                ));
            }
            data.caps = Some(caps.clone());
        }
        let ctx = self.context();
        let result = self.element.handle_caps(pad, &caps, &ctx);
        self.interpret("handle_caps", result, Some((pad, &Forwardable::Caps(caps))))
    }
}

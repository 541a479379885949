//! Demand controller: `handle_demand` for pull output pads.

use crate::element::actor::ElementCore;
use crate::element::PadRef;
use crate::error::Result;

impl ElementCore {
    /// Invoke the element's `handle_demand` with the pad's total
    /// outstanding demand. A no-op while nothing is demanded.
    pub(crate) fn invoke_handle_demand(&mut self, pad: &PadRef) -> Result<()> {
        let (size, unit) = {
            let data = self.pads.get(pad)?;
            (data.demand, data.unit)
        };
        if size == 0 {
            return Ok(());
        }
        let ctx = self.context();
        let result = self.element.handle_demand(pad, size, unit, &ctx);
        self.interpret("handle_demand", result, None)
    }
}

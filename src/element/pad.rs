//! Pad references and declarations.
//!
//! Pads are the connection points of elements. An element statically
//! declares the pads it can have ([`PadSpec`]); at link time the parent
//! instantiates them into concrete references ([`PadRef`]) and wires the
//! two ends of a link together.

use crate::buffer::Buffer;
use crate::format::CapsConstraint;
use std::fmt;

/// Direction of a pad (input or output).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// An input pad (receives stream items from upstream).
    Input,
    /// An output pad (sends stream items downstream).
    Output,
}

impl PadDirection {
    /// The other direction.
    pub fn opposite(self) -> Self {
        match self {
            PadDirection::Input => PadDirection::Output,
            PadDirection::Output => PadDirection::Input,
        }
    }
}

/// Flow-control mode of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PadMode {
    /// Demand-driven: the consumer authorizes production with demand
    /// messages and the producer never exceeds its budget.
    #[default]
    Pull,
    /// Producer-driven: the producer emits at will; the consumer is guarded
    /// by a toilet counter that kills the producer on overflow.
    Push,
}

/// Whether a pad is always present or created per link request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PadAvailability {
    /// Pad exists from element creation and takes part in at most one link.
    #[default]
    Always,
    /// A fresh pad instance is created for every link request.
    OnRequest,
}

/// The unit demand is counted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DemandUnit {
    /// One unit per buffer.
    #[default]
    Buffers,
    /// One unit per payload byte.
    Bytes,
}

impl DemandUnit {
    /// Measure a single buffer in this unit.
    pub fn measure_one(self, buffer: &Buffer) -> u64 {
        match self {
            DemandUnit::Buffers => 1,
            DemandUnit::Bytes => buffer.len() as u64,
        }
    }

    /// Measure a batch of buffers in this unit.
    pub fn measure(self, buffers: &[Buffer]) -> u64 {
        buffers.iter().map(|b| self.measure_one(b)).sum()
    }
}

/// Reference to a concrete pad: its declared name plus an instance id for
/// on-request pads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PadRef {
    /// Declared pad name.
    pub name: String,
    /// Instance id, set only for on-request pads.
    pub instance: Option<u32>,
}

impl PadRef {
    /// Reference a static pad by name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance: None,
        }
    }

    /// Reference an instance of an on-request pad.
    pub fn instance(name: impl Into<String>, instance: u32) -> Self {
        Self {
            name: name.into(),
            instance: Some(instance),
        }
    }
}

impl From<&str> for PadRef {
    fn from(name: &str) -> Self {
        PadRef::new(name)
    }
}

impl fmt::Display for PadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.instance {
            Some(i) => write!(f, "{}:{}", self.name, i),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Declaration of a pad an element can have.
///
/// # Examples
///
/// ```rust
/// use millrace::element::{DemandUnit, PadSpec};
///
/// // A pull input accepting anything, preferring 20 queued buffers.
/// let sink = PadSpec::input("sink").preferred_size(20);
///
/// // A push output counted in bytes.
/// let src = PadSpec::output("src").push().unit(DemandUnit::Bytes);
/// ```
#[derive(Debug, Clone)]
pub struct PadSpec {
    /// Pad name, unique within the element and direction.
    pub name: String,
    /// Pad direction.
    pub direction: PadDirection,
    /// Flow-control mode.
    pub mode: PadMode,
    /// Whether the pad is always present or created per request.
    pub availability: PadAvailability,
    /// Unit demand is counted in.
    pub unit: DemandUnit,
    /// Caps this pad accepts.
    pub caps: CapsConstraint,
    /// Input-buffer watermark override (input pads).
    pub preferred_size: Option<u64>,
    /// Toilet capacity override (push-mode input pads).
    pub toilet_capacity: Option<i64>,
}

impl PadSpec {
    /// Declare an always-present pull input pad.
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            direction: PadDirection::Input,
            mode: PadMode::Pull,
            availability: PadAvailability::Always,
            unit: DemandUnit::Buffers,
            caps: CapsConstraint::Any,
            preferred_size: None,
            toilet_capacity: None,
        }
    }

    /// Declare an always-present pull output pad.
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            direction: PadDirection::Output,
            ..Self::input(name)
        }
    }

    /// Switch the pad to push mode.
    pub fn push(mut self) -> Self {
        self.mode = PadMode::Push;
        self
    }

    /// Make the pad on-request.
    pub fn on_request(mut self) -> Self {
        self.availability = PadAvailability::OnRequest;
        self
    }

    /// Set the demand unit.
    pub fn unit(mut self, unit: DemandUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Constrain the caps this pad accepts.
    pub fn caps(mut self, caps: impl Into<CapsConstraint>) -> Self {
        self.caps = caps.into();
        self
    }

    /// Override the input-buffer watermark for this pad.
    pub fn preferred_size(mut self, size: u64) -> Self {
        self.preferred_size = Some(size);
        self
    }

    /// Override the toilet capacity for this pad.
    pub fn toilet_capacity(mut self, capacity: i64) -> Self {
        self.toilet_capacity = Some(capacity);
        self
    }
}

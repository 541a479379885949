//! Pipeline and bin construction specs.
//!
//! A [`Spec`] names the children a parent spawns and the links between
//! their pads. Inside a bin's spec, the [`Endpoint::itself`] sentinel
//! binds a child pad to one of the bin's own proxy pads, letting links
//! cross the bin boundary.

use crate::element::{Element, PadRef, PadSpec};

/// A link endpoint: a child (or the surrounding bin) plus one of its pads.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub(crate) child: ChildRef,
    pub(crate) pad: PadRef,
}

/// Who owns the pad of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChildRef {
    /// A named child of this parent.
    Child(String),
    /// The surrounding bin's own pad (valid only inside a bin spec).
    Itself,
}

impl Endpoint {
    /// An endpoint on a named child.
    pub fn child(name: impl Into<String>, pad: impl Into<PadRef>) -> Self {
        Self {
            child: ChildRef::Child(name.into()),
            pad: pad.into(),
        }
    }

    /// An endpoint on the surrounding bin's own pad.
    pub fn itself(pad: impl Into<PadRef>) -> Self {
        Self {
            child: ChildRef::Itself,
            pad: pad.into(),
        }
    }
}

impl From<(&str, &str)> for Endpoint {
    fn from((child, pad): (&str, &str)) -> Self {
        Endpoint::child(child, pad)
    }
}

/// One link between an output pad and an input pad.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    /// The producing end (an output pad).
    pub(crate) from: Endpoint,
    /// The consuming end (an input pad).
    pub(crate) to: Endpoint,
}

impl LinkSpec {
    /// Link `from` (output) to `to` (input).
    pub fn new(from: impl Into<Endpoint>, to: impl Into<Endpoint>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// A child definition: a plain element or a nested bin.
pub(crate) enum ChildDef {
    Element(Box<dyn Element>),
    Bin(Bin),
}

/// A bin: a parent that is itself a child.
///
/// The bin declares its own proxy pads; its internal spec must bind each
/// of them to an inner child via an [`Endpoint::itself`] link.
pub struct Bin {
    pub(crate) pads: Vec<PadSpec>,
    pub(crate) spec: Spec,
}

impl Bin {
    /// Create a bin with the given proxy pads and internal spec.
    pub fn new(pads: Vec<PadSpec>, spec: Spec) -> Self {
        Self { pads, spec }
    }
}

impl std::fmt::Debug for Bin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bin")
            .field("pads", &self.pads.len())
            .field("children", &self.spec.children.len())
            .finish()
    }
}

/// Children and links handed to a pipeline or bin at startup.
///
/// # Examples
///
/// ```rust,ignore
/// let spec = Spec::new()
///     .child("src", MySource::new())
///     .child("sink", MySink::new())
///     .link(("src", "src"), ("sink", "sink"));
/// ```
#[derive(Default)]
pub struct Spec {
    pub(crate) children: Vec<(String, ChildDef)>,
    pub(crate) links: Vec<LinkSpec>,
}

impl Spec {
    /// An empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element child.
    pub fn child(mut self, name: impl Into<String>, element: impl Element) -> Self {
        self.children
            .push((name.into(), ChildDef::Element(Box::new(element))));
        self
    }

    /// Add a bin child.
    pub fn bin(mut self, name: impl Into<String>, bin: Bin) -> Self {
        self.children.push((name.into(), ChildDef::Bin(bin)));
        self
    }

    /// Add a link from an output pad to an input pad.
    pub fn link(mut self, from: impl Into<Endpoint>, to: impl Into<Endpoint>) -> Self {
        self.links.push(LinkSpec::new(from, to));
        self
    }
}

impl std::fmt::Debug for Spec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.children.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("Spec")
            .field("children", &names)
            .field("links", &self.links.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;
    impl Element for Dummy {}

    #[test]
    fn test_spec_builder() {
        let spec = Spec::new()
            .child("src", Dummy)
            .child("sink", Dummy)
            .link(("src", "src"), ("sink", "sink"));
        assert_eq!(spec.children.len(), 2);
        assert_eq!(spec.links.len(), 1);
        assert_eq!(spec.children[0].0, "src");
    }

    #[test]
    fn test_endpoint_forms() {
        let ep = Endpoint::child("mixer", "sink");
        assert_eq!(ep.child, ChildRef::Child("mixer".into()));

        let ep = Endpoint::itself("src");
        assert_eq!(ep.child, ChildRef::Itself);
        assert_eq!(ep.pad, PadRef::new("src"));

        let ep: Endpoint = ("a", "src").into();
        assert_eq!(ep.child, ChildRef::Child("a".into()));
    }
}

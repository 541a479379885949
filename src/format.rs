//! Stream format descriptors and capability constraints.
//!
//! [`Caps`] describe the format of the data flowing over a link (e.g.
//! sample rate and channel layout for raw audio). The core never interprets
//! them; it only compares them structurally and checks them against the
//! constraints pads declare.
//!
//! Pads constrain the caps they accept with [`CapsConstraint`]: either
//! anything, or a list of [`CapsPattern`]s where each field is `Any`,
//! `Fixed`, or `OneOf` a set of values.

use std::fmt;

/// A field value inside [`Caps`].
#[derive(Debug, Clone, PartialEq)]
pub enum CapsField {
    /// Integer value (rates, sizes, counts).
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value (layouts, encodings).
    Str(String),
    /// Boolean flag.
    Bool(bool),
}

impl From<i64> for CapsField {
    fn from(v: i64) -> Self {
        CapsField::Int(v)
    }
}

impl From<&str> for CapsField {
    fn from(v: &str) -> Self {
        CapsField::Str(v.to_string())
    }
}

impl From<bool> for CapsField {
    fn from(v: bool) -> Self {
        CapsField::Bool(v)
    }
}

impl fmt::Display for CapsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsField::Int(v) => write!(f, "{v}"),
            CapsField::Float(v) => write!(f, "{v}"),
            CapsField::Str(v) => write!(f, "{v}"),
            CapsField::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A structured stream format descriptor.
///
/// Caps consist of a media name (e.g. `"audio/raw"`) and a set of named
/// fields. Two caps are equal when their media names and all fields are
/// equal; field order does not matter (fields are kept sorted by key).
///
/// # Examples
///
/// ```rust
/// use millrace::format::Caps;
///
/// let caps = Caps::new("audio/raw")
///     .with_field("rate", 48_000)
///     .with_field("layout", "interleaved");
///
/// assert_eq!(caps.media(), "audio/raw");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Caps {
    media: String,
    fields: Vec<(String, CapsField)>,
}

impl Caps {
    /// Create caps with the given media name and no fields.
    pub fn new(media: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            fields: Vec::new(),
        }
    }

    /// Add or replace a field, keeping fields sorted by key.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<CapsField>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.fields.binary_search_by(|(k, _)| k.as_str().cmp(&key)) {
            Ok(i) => self.fields[i].1 = value,
            Err(i) => self.fields.insert(i, (key, value)),
        }
        self
    }

    /// Get the media name.
    pub fn media(&self) -> &str {
        &self.media
    }

    /// Look up a field by key.
    pub fn field(&self, key: &str) -> Option<&CapsField> {
        self.fields
            .binary_search_by(|(k, _)| k.as_str().cmp(key))
            .ok()
            .map(|i| &self.fields[i].1)
    }

    /// Iterate over all fields in key order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &CapsField)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.media)?;
        for (key, value) in &self.fields {
            write!(f, ", {key}={value}")?;
        }
        Ok(())
    }
}

/// A constraint on one caps field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPattern {
    /// Any value (including an absent field).
    Any,
    /// Exactly this value.
    Fixed(CapsField),
    /// One of these values.
    OneOf(Vec<CapsField>),
}

impl FieldPattern {
    fn accepts(&self, value: Option<&CapsField>) -> bool {
        match self {
            FieldPattern::Any => true,
            FieldPattern::Fixed(expected) => value == Some(expected),
            FieldPattern::OneOf(options) => value.is_some_and(|v| options.contains(v)),
        }
    }
}

/// A pattern caps can be matched against.
///
/// The media name must match exactly; each constrained field must be
/// present in the caps and satisfy its [`FieldPattern`].
#[derive(Debug, Clone, PartialEq)]
pub struct CapsPattern {
    media: String,
    fields: Vec<(String, FieldPattern)>,
}

impl CapsPattern {
    /// Create a pattern matching any caps with the given media name.
    pub fn new(media: impl Into<String>) -> Self {
        Self {
            media: media.into(),
            fields: Vec::new(),
        }
    }

    /// Constrain a field.
    pub fn with_field(mut self, key: impl Into<String>, pattern: FieldPattern) -> Self {
        self.fields.push((key.into(), pattern));
        self
    }

    /// Check whether the given caps satisfy this pattern.
    pub fn accepts(&self, caps: &Caps) -> bool {
        caps.media() == self.media
            && self
                .fields
                .iter()
                .all(|(key, pattern)| pattern.accepts(caps.field(key)))
    }
}

/// The caps a pad declares it accepts.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CapsConstraint {
    /// Any caps are accepted.
    #[default]
    Any,
    /// Caps must satisfy at least one of these patterns.
    Patterns(Vec<CapsPattern>),
}

impl CapsConstraint {
    /// Check whether the given caps satisfy this constraint.
    pub fn accepts(&self, caps: &Caps) -> bool {
        match self {
            CapsConstraint::Any => true,
            CapsConstraint::Patterns(patterns) => patterns.iter().any(|p| p.accepts(caps)),
        }
    }
}

impl From<CapsPattern> for CapsConstraint {
    fn from(pattern: CapsPattern) -> Self {
        CapsConstraint::Patterns(vec![pattern])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_caps(rate: i64) -> Caps {
        Caps::new("audio/raw")
            .with_field("rate", rate)
            .with_field("layout", "interleaved")
    }

    #[test]
    fn test_structural_equality_ignores_insertion_order() {
        let a = Caps::new("audio/raw")
            .with_field("rate", 48_000)
            .with_field("layout", "interleaved");
        let b = Caps::new("audio/raw")
            .with_field("layout", "interleaved")
            .with_field("rate", 48_000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_field_replacement() {
        let caps = audio_caps(44_100).with_field("rate", 48_000);
        assert_eq!(caps.field("rate"), Some(&CapsField::Int(48_000)));
    }

    #[test]
    fn test_pattern_matching() {
        let pattern = CapsPattern::new("audio/raw")
            .with_field("rate", FieldPattern::OneOf(vec![44_100.into(), 48_000.into()]))
            .with_field("layout", FieldPattern::Fixed("interleaved".into()));

        assert!(pattern.accepts(&audio_caps(48_000)));
        assert!(!pattern.accepts(&audio_caps(96_000)));
        assert!(!pattern.accepts(&Caps::new("video/raw")));
    }

    #[test]
    fn test_constraint_any_and_patterns() {
        assert!(CapsConstraint::Any.accepts(&audio_caps(48_000)));

        let constraint: CapsConstraint = CapsPattern::new("audio/raw").into();
        assert!(constraint.accepts(&audio_caps(48_000)));
        assert!(!constraint.accepts(&Caps::new("video/raw")));
    }

    #[test]
    fn test_missing_field_only_matches_any() {
        let caps = Caps::new("audio/raw");
        let fixed = CapsPattern::new("audio/raw")
            .with_field("rate", FieldPattern::Fixed(48_000.into()));
        let any = CapsPattern::new("audio/raw").with_field("rate", FieldPattern::Any);

        assert!(!fixed.accepts(&caps));
        assert!(any.accepts(&caps));
    }
}

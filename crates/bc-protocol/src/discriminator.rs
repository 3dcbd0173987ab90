//! Central registry mapping canonical change-type names to every observed
//! wire discriminator variant (full names and shorthand codes).
//!
//! No code outside this module may compare a raw discriminator string
//! literal (`"drch"`, `"PropertyChanges"`, ...) directly; every comparison
//! goes through [`CanonicalChange::from_wire`].

use std::fmt;

/// A canonical change-type name, independent of which shorthand or
/// full-name spelling the server happened to use on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalChange {
    PropertyChanges,
    DataRefreshChange,
    DataRowInserted,
    DataRowRemoved,
    DataRowChanged,
    FormToShowChange,
    ValidationMessage,
    ErrorMessage,
}

impl CanonicalChange {
    /// All (full name, shorthand) pairs this registry recognizes.
    const TABLE: &'static [(Self, &'static str, &'static str)] = &[
        (Self::PropertyChanges, "PropertyChanges", "prc"),
        (Self::DataRefreshChange, "DataRefreshChange", "drch"),
        (Self::DataRowInserted, "DataRowInserted", "drich"),
        (Self::DataRowRemoved, "DataRowRemoved", "drrch"),
        (Self::DataRowChanged, "DataRowChanged", "drch2"),
        (Self::FormToShowChange, "FormToShowChange", "ftserc"),
        (Self::ValidationMessage, "ValidationMessage", "vmch"),
        (Self::ErrorMessage, "ErrorMessage", "erch"),
    ];

    /// Resolve a raw wire discriminator (full name or shorthand) to its
    /// canonical variant. Unknown discriminators are not an error here —
    /// callers typically want to skip handlers they don't recognize rather
    /// than fail the whole batch — see [`Self::try_from_wire`] for the
    /// fallible form.
    #[must_use]
    pub fn from_wire(raw: &str) -> Option<Self> {
        Self::TABLE
            .iter()
            .find(|(_, full, short)| *full == raw || *short == raw)
            .map(|(canonical, ..)| *canonical)
    }

    /// Same as [`Self::from_wire`] but returns a typed error naming the
    /// unrecognized discriminator, for call sites that must fail closed.
    pub fn try_from_wire(raw: &str) -> Result<Self, crate::error::ProtocolError> {
        Self::from_wire(raw)
            .ok_or_else(|| crate::error::ProtocolError::UnknownDiscriminator(raw.to_string()))
    }

    /// The canonical full name, used for logging and debug output.
    #[must_use]
    pub fn canonical_name(self) -> &'static str {
        Self::TABLE
            .iter()
            .find(|(c, ..)| *c == self)
            .map(|(_, full, _)| *full)
            .unwrap_or("Unknown")
    }
}

impl fmt::Display for CanonicalChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

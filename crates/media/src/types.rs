use serde::{Deserialize, Serialize};

/// An opaque reference to an attached media file.
///
/// The locator is whatever the transport hands us (a URL, a local path);
/// the core never interprets it beyond passing it to the probe and the
/// processing backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub locator: String,
    pub size_bytes: u64,
}

impl MediaRef {
    #[must_use]
    pub fn new(locator: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            locator: locator.into(),
            size_bytes,
        }
    }
}

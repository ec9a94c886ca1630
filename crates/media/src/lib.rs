//! Media fragment types and the external duration probe.
//!
//! The probe wraps the `ffprobe` CLI as a black-box validator: any failure
//! (missing binary, non-zero exit, unparsable output, probe timeout) is an
//! ordinary error the caller treats as a validation failure, never a crash.

pub mod error;
pub mod probe;
pub mod types;

pub use {
    error::{Error, Result},
    probe::{DurationProbe, FfprobeProbe},
    types::MediaRef,
};

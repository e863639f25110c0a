//! Named failures for the instrument link.
//!
//! Everything else in the crate travels as `anyhow::Error`; these types exist
//! so callers (and tests) can tell a malformed reply or a missing device apart
//! from a plain I/O failure with `downcast_ref`.

use thiserror::Error;

/// The device answered, but not in the shape the command promises.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("empty response from device for command {command:?}")]
    EmptyResponse { command: String },

    #[error("reply to {command:?} has {found} field(s), expected {expected}: {reply:?}")]
    FieldCount {
        command: String,
        expected: usize,
        found: usize,
        reply: String,
    },

    #[error("reply to {command:?} contains a non-numeric field {field:?}")]
    InvalidNumber { command: String, field: String },

    #[error("USBTMC framing error: {0}")]
    Framing(String),
}

/// The device could not be opened; nothing has been sent to it yet.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("no USB device with ID {vendor_id:04x}:{product_id:04x}")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("device has no USBTMC interface")]
    NoTmcInterface,

    #[error("USBTMC interface has no bulk {0} endpoint")]
    MissingEndpoint(&'static str),
}

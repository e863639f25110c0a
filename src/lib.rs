pub mod error;
pub mod instrument;
pub mod monitor;
pub mod report;
pub mod script;
pub mod shutdown;
pub mod transport;
pub mod validate;

// Re-export the primary types so users can depend on the crate
// without knowing the internal module layout.
pub use error::{ConnectionError, ProtocolError};
pub use instrument::*;
pub use transport::{MockTransport, Transport, UsbTmc};

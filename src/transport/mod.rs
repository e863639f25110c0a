//! Byte-level links to the instrument.
//!
//! The session only ever speaks whole SCPI lines, so the trait is expressed in
//! strings: implementations add the line terminator on the way out and strip
//! it (plus any NUL padding) on the way in.

pub mod mock;
pub mod usbtmc;

use anyhow::Result;
use async_trait::async_trait;

pub use mock::{Call, MockTransport};
pub use usbtmc::UsbTmc;

#[async_trait]
pub trait Transport: Send {
    /// Send one command line.
    async fn write(&mut self, command: &str) -> Result<()>;

    /// Read one reply, trimmed.
    async fn read(&mut self) -> Result<String>;

    /// Send a query and read its reply.
    async fn ask(&mut self, command: &str) -> Result<String> {
        self.write(command).await?;
        self.read().await
    }

    /// Release the underlying handle.
    async fn close(&mut self) -> Result<()>;
}

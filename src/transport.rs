//! The capability every backend provides: writing a payload to a handle on
//! one device.

use futures::future::BoxFuture;

use crate::Result;

/// A transport that can write a payload to a GATT handle of one device.
///
/// Implementations differ in how they report exhausted retries; see the
/// individual backends.
pub trait Transport: Send + Sync {
    /// Writes `payload` to `handle` on the transport's device
    fn write<'a>(&'a self, handle: u16, payload: &'a [u8]) -> BoxFuture<'a, Result<()>>;

    /// Short name used in logs
    fn kind(&self) -> &'static str;

    /// Releases the transport once every accepted write has been handled
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

//! Stream abstraction
//!
//! Unified stream type handed out by every dialer, so the harness and the
//! relay never care whether bytes travel over plain TCP, a SOCKS5 tunnel,
//! or TLS on top of one.

use tokio::io::{AsyncRead, AsyncWrite};

/// The stream type used throughout the crate.
pub type Stream = Box<dyn AsyncReadWrite + Unpin + Send>;

/// Combined trait for async read + write
pub trait AsyncReadWrite: AsyncRead + AsyncWrite {}

impl<T: AsyncRead + AsyncWrite> AsyncReadWrite for T {}

/// Trait for types that can be converted into a Stream
pub trait IntoStream {
    fn into_stream(self) -> Stream;
}

impl<T> IntoStream for T
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn into_stream(self) -> Stream {
        Box::new(self)
    }
}

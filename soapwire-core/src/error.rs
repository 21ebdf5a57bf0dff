//! Errors raised while assembling requests or rebuilding responses.

/// Errors from the I/O-free message handling layer.
///
/// None of these are retried internally. The client crate maps them onto its
/// caller-facing error classes (resource, protocol).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The buffer could not grow to the requested size.
    ///
    /// The buffer is left empty with zero capacity; the message being
    /// assembled is lost and the whole request must be restarted.
    #[error("out of memory growing buffer to {requested} bytes")]
    OutOfMemory { requested: usize },

    /// Malformed or unexpected message data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The caller's receive buffer cannot hold the reconstructed header block.
    #[error("buffer too small for response headers: need {needed} bytes, have {available}")]
    HeaderBufferTooSmall { needed: usize, available: usize },
}

impl CoreError {
    /// Create a protocol error from any message.
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        CoreError::Protocol(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CoreError::OutOfMemory { requested: 8192 };
        assert_eq!(err.to_string(), "out of memory growing buffer to 8192 bytes");

        let err = CoreError::protocol("bad chunk");
        assert_eq!(err.to_string(), "protocol error: bad chunk");

        let err = CoreError::HeaderBufferTooSmall {
            needed: 40,
            available: 10,
        };
        assert!(err.to_string().contains("need 40 bytes"));
    }
}

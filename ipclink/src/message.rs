//! Fixed-maximum-length message payloads.
//!
//! Messages are opaque byte sequences bounded by [`MAX_MESSAGE_LENGTH`].
//! Over-length input is rejected at construction, never truncated.

use crate::error::IpcError;

/// Maximum allowed length of a message transmitted through a connection.
pub const MAX_MESSAGE_LENGTH: usize = 512;

/// One discrete application message.
///
/// Invariant: the payload never exceeds [`MAX_MESSAGE_LENGTH`] bytes.
///
/// # Examples
///
/// ```
/// use ipclink::{Message, MAX_MESSAGE_LENGTH};
///
/// let message = Message::new(b"hello").expect("within bounds");
/// assert_eq!(message.as_bytes(), b"hello");
///
/// let too_long = vec![0u8; MAX_MESSAGE_LENGTH + 1];
/// assert!(Message::new(&too_long).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    bytes: Vec<u8>,
}

impl Message {
    /// Create a message from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns [`IpcError::MessageTooLong`] if the slice exceeds
    /// [`MAX_MESSAGE_LENGTH`].
    pub fn new(bytes: &[u8]) -> Result<Self, IpcError> {
        Self::try_from(bytes.to_vec())
    }

    /// Borrow the message payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consume the message, returning the owned payload.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }
}

impl TryFrom<Vec<u8>> for Message {
    type Error = IpcError;

    fn try_from(bytes: Vec<u8>) -> Result<Self, Self::Error> {
        if bytes.len() > MAX_MESSAGE_LENGTH {
            return Err(IpcError::MessageTooLong {
                length: bytes.len(),
                maximum: MAX_MESSAGE_LENGTH,
            });
        }
        Ok(Self { bytes })
    }
}

impl TryFrom<&[u8]> for Message {
    type Error = IpcError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::try_from(bytes.to_vec())
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Message> for Vec<u8> {
    fn from(message: Message) -> Self {
        message.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_within_bounds() {
        let message = Message::new(b"telemetry sample").expect("valid length");
        assert_eq!(message.as_bytes(), b"telemetry sample");
        assert_eq!(message.len(), 16);
        assert!(!message.is_empty());
    }

    #[test]
    fn test_message_at_limit() {
        let payload = vec![0xAB; MAX_MESSAGE_LENGTH];
        let message = Message::new(&payload).expect("exactly at limit");
        assert_eq!(message.len(), MAX_MESSAGE_LENGTH);
        assert_eq!(message.into_vec(), payload);
    }

    #[test]
    fn test_message_over_limit_rejected() {
        let payload = vec![0u8; MAX_MESSAGE_LENGTH + 1];
        let result = Message::new(&payload);
        assert!(matches!(
            result,
            Err(IpcError::MessageTooLong { length, maximum })
                if length == MAX_MESSAGE_LENGTH + 1 && maximum == MAX_MESSAGE_LENGTH
        ));
    }

    #[test]
    fn test_empty_message_allowed() {
        let message = Message::new(&[]).expect("empty is valid");
        assert!(message.is_empty());
    }
}

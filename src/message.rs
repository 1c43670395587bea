use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::error::Error;

/// 128-bit opaque message identity, rendered as 32 lowercase hex characters.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct MessageId([u8; 16]);

impl MessageId {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for MessageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s).map_err(|e| Error::protocol(e))?;
        let bytes: [u8; 16] = decoded
            .try_into()
            .map_err(|_| Error::protocol("message id must be 32 hex characters"))?;
        Ok(Self(bytes))
    }
}

/// A published message: a value object, identity carried by `id` alone.
#[derive(Clone)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    pub payload: Vec<u8>,
    pub sent_at: Instant,
    /// Set by the broker on the most recent delivery attempt; `None` until
    /// the first one.
    pub delivered_at: Option<Instant>,
}

impl Message {
    pub fn new(id: MessageId, topic: String, payload: Vec<u8>) -> Self {
        Self {
            id,
            topic,
            payload,
            sent_at: Instant::now(),
            delivered_at: None,
        }
    }
}

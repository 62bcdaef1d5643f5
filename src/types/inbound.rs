//! Raw inbound transport messages

/// A message as delivered by the transport, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Binary payload (a JPEG frame)
    Binary(Vec<u8>),

    /// Text payload (a JSON control message)
    Text(String),
}

impl Inbound {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        match self {
            Inbound::Binary(bytes) => bytes.len(),
            Inbound::Text(text) => text.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

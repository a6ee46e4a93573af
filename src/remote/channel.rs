use crate::device::constants::FRAME_TERMINATOR;

/// One outbound message: the text followed by a carriage return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn new(text: &str) -> Self {
        let mut bytes = Vec::with_capacity(text.len() + FRAME_TERMINATOR.len());
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(FRAME_TERMINATOR.as_bytes());
        Frame { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

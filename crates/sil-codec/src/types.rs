//! Raw CAN frame type shared across the rig.

/// A raw CAN 2.0A frame (standard 11-bit ID).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    /// CAN arbitration ID (11-bit standard).
    pub id: u32,
    /// Data payload (0-8 bytes).
    pub data: Vec<u8>,
}

impl CanFrame {
    pub fn new(id: u32, data: Vec<u8>) -> Self {
        Self { id, data }
    }
}

//! E2E-protected CAN frame codec for the SIL rig.
//!
//! Provides the CRC-8 J1850 checksum, per-ID alive counters, the static
//! signal schema with typed decoding, bit-identical command-frame builders,
//! and the `CanBus` trait with SocketCAN and mock implementations.

pub mod builders;
pub mod bus;
pub mod crc;
pub mod e2e;
pub mod error;
pub mod mock;
pub mod schema;
pub mod types;

pub use builders::{BrakeMode, Direction};
pub use bus::CanBus;
#[cfg(target_os = "linux")]
pub use bus::SocketCanBus;
pub use crc::crc8_j1850;
pub use e2e::FrameCodec;
pub use error::{CanError, CanResult, CodecError, CodecResult};
pub use mock::MockCanBus;
pub use schema::{DecodedFrame, DecodedSignal, decode_by_id, decode_signal};
pub use types::CanFrame;

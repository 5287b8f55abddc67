//! End-to-end integration tests for the SIL rig.
//!
//! All tests live under `tests/` and drive real code paths across crate
//! boundaries through mock bus and broker channels.

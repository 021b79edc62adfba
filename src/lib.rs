//! AIOS - agent-assisted fixing of overlong source lines
//!
//! The binary wires configuration, the coordinator, housekeeping and the
//! gateway together; `scan` is shared with the integration tests.

pub mod scan;

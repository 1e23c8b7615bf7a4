//! Library side of the `schemap` binary.

pub mod inputs;
pub mod logging;

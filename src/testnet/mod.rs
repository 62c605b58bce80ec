//! Helpers shared by the unit tests: funded ledgers, quick mining and
//! loopback node settings.

pub mod test_utils;

pub use test_utils::*;

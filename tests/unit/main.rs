//! Unit test suite
//!
//! Exercises the public API of the pure pipeline stages: snapshot
//! projection, matching, endpoint planning, wire schema and retry. Nothing
//! here needs a broker, cache or database.

mod channels_test;
mod config_test;
mod events_test;
mod matcher_test;
mod retry_test;
mod snapshot_test;

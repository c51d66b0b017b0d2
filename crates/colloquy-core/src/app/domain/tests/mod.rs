//! Domain tests module.
//!
//! - Property tests: proptest-based invariants of turn and step projection
//! - Replay tests: reordered, paged and duplicated deliveries of one log
//! - Queue tests: follow-up ordering against the session state

mod property;
mod replay;

//! Alert post-processing on top of the canonical model.
//!
//! [`group`] collapses duplicate alerts into one representative per logical
//! incident, [`ack`] persists and merges operator acknowledgment state, and
//! [`silence`] evaluates time-bounded suppression rules. All three run on
//! every poll result; grouping and silencing are pure functions of their
//! inputs.

pub mod ack;
pub mod group;
pub mod silence;

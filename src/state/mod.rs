//! The lifecycle state machine for change requests.

pub mod transitions;

pub use transitions::{apply, is_replay, Transition};

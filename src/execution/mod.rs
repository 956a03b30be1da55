pub mod machine;
pub mod runner;

pub use machine::{decide_next_state, Action};
pub use runner::{RunMode, RunOutcome, Runner};

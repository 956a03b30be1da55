use crate::delivery::types::StructuredRecord;
use crate::hub::types::ExecutionState;

/// What the run driver should do next for an execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Download input files and extract data.
    Extract,
    /// Wait for a human to confirm or cancel the extracted data.
    AwaitReview,
    /// Deliver the confirmed data to every destination.
    Deliver(StructuredRecord),
    /// Nothing left to do.
    Halt,
}

/// Decide the next action from the current persisted state.
///
/// Pure: the same state always yields the same action.
pub fn decide_next_state(current: &ExecutionState) -> Action {
    match current {
        ExecutionState::Canceled => Action::Halt,
        ExecutionState::DeliveredToDestination { .. } => Action::Halt,
        ExecutionState::PendingDataExtraction => Action::Extract,
        ExecutionState::PendingReview { .. } => Action::AwaitReview,
        ExecutionState::Confirmed { data_confirmed } => Action::Deliver(data_confirmed.clone()),
    }
}

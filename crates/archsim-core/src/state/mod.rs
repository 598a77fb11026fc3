//! Mutable architectural state: the register file and the executor's run
//! state.

/// Register file built from the architecture description.
pub mod registers;
/// Executor state machine.
pub mod run_state;

pub use registers::{
    Precision, RegisterDelta, RegisterError, RegisterFile, RegisterRef, RegisterValue,
    WriteOutcome,
};
pub use run_state::RunState;

//! Execution engine for devbox
//!
//! Planning lives in the `converge` crate. The engine covers what happens
//! around it:
//! 1. Displaying - show the diff and the commands it turns into
//! 2. Executing - confirm, then run the commands in order

pub mod differ;
pub mod executor;

pub use differ::display_diff;
pub use executor::{ExecuteOptions, confirm, execute, print_summary};

//! Domain models for the onclinic system.

mod bill;
mod inventory;
mod ledger;
mod patient;
mod prescription;

pub use bill::*;
pub use inventory::*;
pub use ledger::*;
pub use patient::*;
pub use prescription::*;

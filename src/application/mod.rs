// Application layer: leave workflow, balance ledger, directory and accounts
// orchestrated over the repository, with role checks on every operation.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;

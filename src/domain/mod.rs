mod access;
mod account;
mod audit;
mod balance;
mod directory;
mod employee;
mod notification;
mod request;
mod role;

pub use access::*;
pub use account::*;
pub use audit::*;
pub use balance::*;
pub use directory::*;
pub use employee::*;
pub use notification::*;
pub use request::*;
pub use role::*;

pub mod domain;
pub mod provisioning_worker;

pub use domain::*;
pub use provisioning_worker::*;

mod agreement_service;
mod in_memory_router_store;
mod observation_router;
mod router_store;

pub use agreement_service::*;
pub use in_memory_router_store::*;
pub use observation_router::*;
pub use router_store::*;

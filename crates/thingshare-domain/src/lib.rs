pub mod agreement;
pub mod batch;
pub mod broker;
pub mod dynamic_value;
pub mod entity;
pub mod error;
pub mod gateway;
pub mod options;
pub mod repository;
pub mod resource;

pub use agreement::*;
pub use batch::*;
pub use broker::*;
pub use dynamic_value::DynamicValue;
pub use entity::*;
pub use error::{DomainError, DomainResult};
pub use gateway::*;
pub use options::PageOptions;
pub use repository::*;
pub use resource::ResourceType;

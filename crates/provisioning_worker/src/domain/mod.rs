mod creation;
mod expander;
mod reconciler;

pub use creation::*;
pub use expander::*;
pub use reconciler::*;

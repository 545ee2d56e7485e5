//! Language specifications and the toolchain registry
mod registry;
mod spec;
pub mod stage;

pub use registry::{LangStatus, Registry, Toolchain};
pub use spec::{merge, LangSpec};

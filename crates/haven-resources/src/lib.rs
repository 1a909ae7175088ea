mod builtin;
mod catalog;

pub use builtin::critical_resources;
pub use catalog::{Resource, ResourceCatalog, ResourceKind};

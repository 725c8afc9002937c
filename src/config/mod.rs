//! Configuration types and loading for autods

mod collaborator;
mod loader;

pub use collaborator::CollaboratorConfig;
pub use loader::{AutodsConfig, Defaults};

//! Built-in secret store variants.

mod ci_variable;
mod directory;
mod generator;
mod manual;
mod repository;
mod vault;

pub use ci_variable::CiVariableStore;
pub use directory::DirectoryCredentialStore;
pub use generator::{Alphabet, GeneratorStore};
pub use manual::ManualActionStore;
pub use repository::RepositorySecretStore;
pub use vault::VaultStore;

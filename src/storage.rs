pub mod directory;
/// YAML serialization for unit and product records.
pub mod record;

pub use directory::{Directory, DirectoryLoadError, FlushError, InitError, init};
pub use record::LoadError;

pub mod archive;
pub mod decompress;
pub mod engine;
pub mod materialize;
pub mod state;
pub mod stream;

pub use crate::domain::model::{EntryStats, MaterializationResult, Package, PackageKind, PackageState};
pub use crate::domain::ports::{ByteSource, ManifestSource, ServiceManager};
pub use crate::utils::error::Result;

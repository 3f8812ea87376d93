pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::{RetrievalBackend, Systemctl};
pub use app::{ManifestLocation, ProvisionReport, ProvisionSettings, Provisioner};
pub use core::engine::ProvisionEngine;
pub use core::stream::CancelToken;
pub use domain::manifest::Manifest;
pub use domain::model::{MaterializationResult, Package, PackageKind, PackageState};
pub use utils::error::{ProvisionError, Result};

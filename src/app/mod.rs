pub mod provision;
pub mod report;

pub use provision::{ManifestLocation, ProvisionSettings, Provisioner};
pub use report::{PackageReport, ProvisionReport, ServiceReport};

use crate::adapters::systemd::DEFAULT_SYSTEMCTL;
use crate::app::provision::{ManifestLocation, ProvisionSettings};
use crate::config::cmdline::DEFAULT_CMDLINE_PATH;
use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_range,
    validate_url, Validate,
};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "nocloud-provision")]
#[command(about = "Provision a freshly booted machine from a content-addressed package manifest")]
pub struct CliConfig {
    /// Manifest URL; defaults to the nocloud= kernel parameter
    #[arg(long)]
    pub manifest_url: Option<String>,

    /// Read the manifest from a local file instead of over HTTP
    #[arg(long, conflicts_with = "manifest_url")]
    pub manifest_file: Option<String>,

    /// Where to look for the nocloud= boot parameter
    #[arg(long, default_value = DEFAULT_CMDLINE_PATH)]
    pub cmdline: String,

    /// Target root that all packages are extracted under
    #[arg(long, default_value = "/")]
    pub root: String,

    /// Override the manifest's retrieval.endpoint (IPFS API host:port or URL)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Number of packages materialized in parallel
    #[arg(long, default_value = "1")]
    pub jobs: usize,

    /// Cancel the run after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Do not enable/start service packages
    #[arg(long)]
    pub no_services: bool,

    #[arg(long, default_value = DEFAULT_SYSTEMCTL)]
    pub systemctl: String,

    /// Write a JSON report of every package outcome to this path
    #[arg(long)]
    pub report: Option<String>,

    /// Show what would be provisioned without fetching packages
    #[arg(long)]
    pub dry_run: bool,

    /// Exit with status 2 when any package fails
    #[arg(long)]
    pub strict: bool,

    /// Log process memory after each package
    #[arg(long)]
    pub monitor: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

impl CliConfig {
    pub fn manifest_location(&self) -> ManifestLocation {
        match (&self.manifest_file, &self.manifest_url) {
            (Some(path), _) => ManifestLocation::File(PathBuf::from(path)),
            (None, Some(url)) => ManifestLocation::Url(url.clone()),
            (None, None) => ManifestLocation::BootParameter(PathBuf::from(&self.cmdline)),
        }
    }

    pub fn to_settings(&self) -> ProvisionSettings {
        ProvisionSettings {
            manifest: self.manifest_location(),
            root: PathBuf::from(&self.root),
            endpoint_override: self.endpoint.clone(),
            jobs: self.jobs,
            timeout: self.timeout.map(Duration::from_secs),
            register_services: !self.no_services,
            monitor: self.monitor,
            dry_run: self.dry_run,
        }
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.manifest_url {
            validate_url("manifest_url", url)?;
        }
        if let Some(path) = &self.manifest_file {
            validate_path("manifest_file", path)?;
        }
        if self.manifest_url.is_some() && self.manifest_file.is_some() {
            return Err(ProvisionError::ConfigError {
                message: "--manifest-url and --manifest-file are mutually exclusive".to_string(),
            });
        }

        validate_path("cmdline", &self.cmdline)?;
        validate_path("root", &self.root)?;
        if let Some(endpoint) = &self.endpoint {
            validate_non_empty_string("endpoint", endpoint)?;
        }

        validate_positive_number("jobs", self.jobs, 1)?;
        validate_range("jobs", self.jobs, 1, 64)?;

        if let Some(timeout) = self.timeout {
            validate_range("timeout", timeout, 1, 24 * 60 * 60)?;
        }

        if !self.no_services {
            validate_path("systemctl", &self.systemctl)?;
        }
        if let Some(report) = &self.report {
            validate_path("report", report)?;
        }

        Ok(())
    }
}

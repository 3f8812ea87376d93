use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("Failed to fetch {content_id}: {message}")]
    FetchError { content_id: String, message: String },

    #[error("Decompression failed: {message}")]
    DecompressError { message: String },

    #[error("Malformed archive: {message}")]
    ArchiveFormatError { message: String },

    #[error("Archive entry escapes target root: {}", path.display())]
    PathEscapeError { path: PathBuf },

    #[error("Failed to materialize {}: {source}", path.display())]
    MaterializeError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid package '{name}': {reason}")]
    InvalidPackage { name: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Package worker failed: {message}")]
    TaskFailed { message: String },

    #[error("Service '{unit}' could not be registered: {message}")]
    ServiceError { unit: String, message: String },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Manifest error: {message}")]
    ManifestError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

/// 錯誤分類，同時作為報告中的錯誤種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Fetch,
    Decompress,
    ArchiveFormat,
    PathEscape,
    Materialize,
    InvalidPackage,
    Cancelled,
    Internal,
    Service,
    Network,
    Io,
    Manifest,
    Configuration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ProvisionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FetchError { .. } => ErrorCategory::Fetch,
            Self::DecompressError { .. } => ErrorCategory::Decompress,
            Self::ArchiveFormatError { .. } => ErrorCategory::ArchiveFormat,
            Self::PathEscapeError { .. } => ErrorCategory::PathEscape,
            Self::MaterializeError { .. } => ErrorCategory::Materialize,
            Self::InvalidPackage { .. } => ErrorCategory::InvalidPackage,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::TaskFailed { .. } => ErrorCategory::Internal,
            Self::ServiceError { .. } => ErrorCategory::Service,
            Self::HttpError(_) => ErrorCategory::Network,
            Self::IoError(_) => ErrorCategory::Io,
            Self::SerializationError(_) | Self::ManifestError { .. } => ErrorCategory::Manifest,
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled | Self::ServiceError { .. } => ErrorSeverity::Low,
            Self::FetchError { .. } | Self::HttpError(_) => ErrorSeverity::Medium,
            Self::DecompressError { .. }
            | Self::ArchiveFormatError { .. }
            | Self::PathEscapeError { .. }
            | Self::MaterializeError { .. }
            | Self::InvalidPackage { .. }
            | Self::SerializationError(_)
            | Self::ManifestError { .. } => ErrorSeverity::High,
            Self::TaskFailed { .. }
            | Self::IoError(_)
            | Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorSeverity::Critical,
        }
    }

    /// 只影響單一套件的錯誤，不會中止整個執行
    pub fn is_package_scoped(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Fetch
                | ErrorCategory::Decompress
                | ErrorCategory::ArchiveFormat
                | ErrorCategory::PathEscape
                | ErrorCategory::Materialize
                | ErrorCategory::InvalidPackage
                | ErrorCategory::Cancelled
                | ErrorCategory::Internal
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Fetch => {
                "Check that the IPFS peer is reachable and that the content identifier is pinned"
            }
            ErrorCategory::Decompress => "Rebuild the package archive with xz and republish it",
            ErrorCategory::ArchiveFormat => {
                "The archive is truncated or not a tar file; republish the package"
            }
            ErrorCategory::PathEscape => {
                "Remove absolute or '..' paths from the package archive"
            }
            ErrorCategory::Materialize => {
                "Check permissions and free space under the target root"
            }
            ErrorCategory::InvalidPackage => {
                "Every package needs a contentID, and service packages need a name"
            }
            ErrorCategory::Cancelled => "Increase --timeout or rerun the provisioning",
            ErrorCategory::Internal => "Rerun with --verbose and report the failure",
            ErrorCategory::Service => "Check that the package ships a systemd unit with that name",
            ErrorCategory::Network => "Check the network and the manifest URL",
            ErrorCategory::Io => "Check that the referenced files exist and are readable",
            ErrorCategory::Manifest => "Validate the manifest document against the expected schema",
            ErrorCategory::Configuration => {
                "Pass nocloud=<url> on the kernel command line or use --manifest-url"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::FetchError { content_id, .. } => {
                format!("Could not retrieve package content {}", content_id)
            }
            Self::PathEscapeError { path } => {
                format!("Refused to write outside the target root: {}", path.display())
            }
            Self::MaterializeError { path, source } => {
                format!("Could not write {}: {}", path.display(), source)
            }
            Self::MissingConfigError { field } => {
                format!("No value found for required setting '{}'", field)
            }
            Self::Cancelled => "Provisioning was cancelled before this step finished".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

// Adapters layer: concrete implementations of the domain ports (IPFS, commands, HTTP, systemd).

pub mod command;
pub mod ipfs;
pub mod manifest;
pub mod retrieval;
pub mod systemd;

pub use command::CommandSource;
pub use ipfs::IpfsHttpSource;
pub use manifest::{FileManifestSource, HttpManifestSource};
pub use retrieval::RetrievalBackend;
pub use systemd::Systemctl;

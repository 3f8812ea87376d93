use crate::adapters::command::CommandSource;
use crate::adapters::ipfs::IpfsHttpSource;
use crate::domain::model::RetrievalConfig;
use crate::domain::ports::ByteSource;
use crate::utils::error::Result;
use std::io::Read;

/// 依清單的 retrieval 設定選擇取得方式；設定了 command 時優先使用
#[derive(Debug, Clone)]
pub enum RetrievalBackend {
    Ipfs(IpfsHttpSource),
    Command(CommandSource),
}

impl RetrievalBackend {
    pub fn from_config(config: &RetrievalConfig) -> Result<Self> {
        match config.command_override() {
            Some(command) => Ok(Self::Command(CommandSource::parse(command)?)),
            None => Ok(Self::Ipfs(IpfsHttpSource::new(&config.endpoint)?)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Ipfs(source) => format!("IPFS API at {}", source.api_base()),
            Self::Command(source) => format!("command '{}'", source.program()),
        }
    }
}

impl ByteSource for RetrievalBackend {
    fn open(&self, content_id: &str) -> Result<Box<dyn Read + Send>> {
        match self {
            Self::Ipfs(source) => source.open(content_id),
            Self::Command(source) => source.open(content_id),
        }
    }
}

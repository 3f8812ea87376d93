use crate::domain::ports::ServiceManager;
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;

pub const DEFAULT_SYSTEMCTL: &str = "/bin/systemctl";

#[derive(Debug, Clone)]
pub struct Systemctl {
    program: PathBuf,
}

impl Systemctl {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, action: &str, unit: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .arg(action)
            .arg(unit)
            .status()
            .await
            .map_err(|e| ProvisionError::ServiceError {
                unit: unit.to_string(),
                message: format!("failed to run {} {}: {}", self.program.display(), action, e),
            })?;

        if !status.success() {
            return Err(ProvisionError::ServiceError {
                unit: unit.to_string(),
                message: format!("{} {} exited with {}", self.program.display(), action, status),
            });
        }
        Ok(())
    }
}

impl Default for Systemctl {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEMCTL)
    }
}

#[async_trait]
impl ServiceManager for Systemctl {
    async fn enable(&self, unit: &str) -> Result<()> {
        self.run("enable", unit).await
    }

    async fn start(&self, unit: &str) -> Result<()> {
        self.run("start", unit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let manager = Systemctl::new("true");
        assert!(manager.enable("agent").await.is_ok());
        assert!(manager.start("agent").await.is_ok());
    }

    #[tokio::test]
    async fn test_failing_command_is_service_error() {
        let manager = Systemctl::new("false");
        assert!(matches!(
            manager.enable("agent").await,
            Err(ProvisionError::ServiceError { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_service_error() {
        let manager = Systemctl::new("/nonexistent/systemctl");
        assert!(matches!(
            manager.start("agent").await,
            Err(ProvisionError::ServiceError { .. })
        ));
    }
}

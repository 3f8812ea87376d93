use crate::domain::ports::ByteSource;
use crate::utils::error::{ProvisionError, Result};
use std::io::{self, Read};
use std::process::{Child, ChildStdout, Command, Stdio};

/// 以外部命令取得內容：內容識別碼附加為最後一個參數，命令的 stdout 即為位元組串流
///
/// 例如 `ipfs cat` 或 `ipget -o /dev/stdout`。
#[derive(Debug, Clone)]
pub struct CommandSource {
    program: String,
    args: Vec<String>,
}

impl CommandSource {
    pub fn parse(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| ProvisionError::InvalidConfigValueError {
            field: "retrieval.command".to_string(),
            value: command.to_string(),
            reason: "Command cannot be empty".to_string(),
        })?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ByteSource for CommandSource {
    fn open(&self, content_id: &str) -> Result<Box<dyn Read + Send>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(content_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ProvisionError::FetchError {
                content_id: content_id.to_string(),
                message: format!("failed to spawn {}: {}", self.program, e),
            })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProvisionError::FetchError {
                content_id: content_id.to_string(),
                message: format!("{} has no stdout pipe", self.program),
            });
        };

        Ok(Box::new(ChildOutput {
            program: self.program.clone(),
            child,
            stdout,
            finished: false,
        }))
    }
}

/// 讀到 EOF 時回收子行程；非零結束碼視為讀取錯誤
struct ChildOutput {
    program: String,
    child: Child,
    stdout: ChildStdout,
    finished: bool,
}

impl Read for ChildOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }

        let n = self.stdout.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.finished = true;
            let status = self.child.wait()?;
            if !status.success() {
                return Err(io::Error::other(format!(
                    "{} exited with {}",
                    self.program, status
                )));
            }
        }
        Ok(n)
    }
}

impl Drop for ChildOutput {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

use crate::utils::error::{ProvisionError, Result};
use regex::Regex;
use std::path::Path;

pub const DEFAULT_CMDLINE_PATH: &str = "/proc/cmdline";
pub const MANIFEST_PARAM: &str = "nocloud";

/// 在核心命令列中尋找 `nocloud=<url>`；值為第一個 `=` 之後的全部內容
pub fn find_manifest_url(cmdline: &str) -> Option<String> {
    let pattern = format!(r"(?:^|\s){}=(\S+)", regex::escape(MANIFEST_PARAM));
    let re = Regex::new(&pattern).ok()?;

    re.captures(cmdline)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|url| !url.is_empty())
}

pub fn read_manifest_url<P: AsRef<Path>>(path: P) -> Result<String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(ProvisionError::IoError)?;
    tracing::debug!("cmdline: {}", content.trim_end());

    match find_manifest_url(&content) {
        Some(url) => {
            tracing::info!("🔎 Found {} boot parameter: {}", MANIFEST_PARAM, url);
            Ok(url)
        }
        None => {
            tracing::warn!(
                "No {}= argument on the kernel command line ({})",
                MANIFEST_PARAM,
                path.display()
            );
            Err(ProvisionError::MissingConfigError {
                field: format!("{}= boot parameter", MANIFEST_PARAM),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_find_manifest_url() {
        let cmdline = "BOOT_IMAGE=/vmlinuz root=/dev/vda1 ro nocloud=http://10.0.0.1/seed.toml quiet\n";
        assert_eq!(
            find_manifest_url(cmdline).as_deref(),
            Some("http://10.0.0.1/seed.toml")
        );
    }

    #[test]
    fn test_url_keeps_query_string() {
        let cmdline = "nocloud=http://seed.local/m?host=a&v=2";
        assert_eq!(
            find_manifest_url(cmdline).as_deref(),
            Some("http://seed.local/m?host=a&v=2")
        );
    }

    #[test]
    fn test_similar_parameter_is_ignored() {
        assert_eq!(find_manifest_url("ds=nocloud-net xnocloud=http://x"), None);
        assert_eq!(find_manifest_url("nocloud= quiet"), None);
        assert_eq!(find_manifest_url(""), None);
    }

    #[test]
    fn test_read_manifest_url_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"console=ttyS0 nocloud=https://seed.example/m.json\n")
            .unwrap();
        assert_eq!(
            read_manifest_url(temp_file.path()).unwrap(),
            "https://seed.example/m.json"
        );

        let mut empty = NamedTempFile::new().unwrap();
        empty.write_all(b"console=ttyS0\n").unwrap();
        assert!(matches!(
            read_manifest_url(empty.path()),
            Err(ProvisionError::MissingConfigError { .. })
        ));
    }
}

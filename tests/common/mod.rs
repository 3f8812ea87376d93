#![allow(dead_code)]

use nocloud_provision::core::{ByteSource, Result};
use nocloud_provision::ProvisionError;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::sync::Mutex;

/// 測試用封存產生器；路徑直接寫進標頭，不經過 tar::Builder 的路徑檢查
pub struct ArchiveBuilder {
    builder: tar::Builder<Vec<u8>>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            builder: tar::Builder::new(Vec::new()),
        }
    }

    pub fn dir(mut self, path: &str, mode: u32) -> Self {
        let header = header(path, tar::EntryType::Directory, mode, 0);
        self.builder.append(&header, std::io::empty()).unwrap();
        self
    }

    pub fn file(mut self, path: &str, mode: u32, data: &[u8]) -> Self {
        let header = header(path, tar::EntryType::Regular, mode, data.len() as u64);
        self.builder.append(&header, data).unwrap();
        self
    }

    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        let mut header = header(path, tar::EntryType::Symlink, 0o777, 0);
        header.set_link_name(target).unwrap();
        header.set_cksum();
        self.builder.append(&header, std::io::empty()).unwrap();
        self
    }

    pub fn into_tar(self) -> Vec<u8> {
        self.builder.into_inner().unwrap()
    }

    pub fn into_tar_xz(self) -> Vec<u8> {
        xz(&self.into_tar())
    }
}

fn header(path: &str, kind: tar::EntryType, mode: u32, size: u64) -> tar::Header {
    let mut header = tar::Header::new_ustar();
    let name = &mut header.as_old_mut().name;
    name[..path.len()].copy_from_slice(path.as_bytes());
    header.set_entry_type(kind);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(1_700_000_000);
    header.set_cksum();
    header
}

pub fn xz(data: &[u8]) -> Vec<u8> {
    let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// 不易壓縮的固定內容
pub fn noise(len: usize) -> Vec<u8> {
    let mut seed = 0x2545_f491_u32;
    (0..len)
        .map(|_| {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            (seed >> 16) as u8
        })
        .collect()
}

/// 依內容識別碼回傳記憶體中的物件
#[derive(Default)]
pub struct MemorySource {
    objects: HashMap<String, Vec<u8>>,
    opened: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, content_id: &str, data: Vec<u8>) -> Self {
        self.objects.insert(content_id.to_string(), data);
        self
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl ByteSource for MemorySource {
    fn open(&self, content_id: &str) -> Result<Box<dyn Read + Send>> {
        self.opened.lock().unwrap().push(content_id.to_string());
        match self.objects.get(content_id) {
            Some(data) => Ok(Box::new(Cursor::new(data.clone()))),
            None => Err(ProvisionError::FetchError {
                content_id: content_id.to_string(),
                message: "object not found".to_string(),
            }),
        }
    }
}

pub fn mode_of(path: &std::path::Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

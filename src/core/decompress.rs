use crate::core::stream::{Stage, StageReader};
use crate::utils::error::{ProvisionError, Result};
use std::io::Read;
use xz2::read::XzDecoder;
use xz2::stream::{Stream, CONCATENATED};

/// 套件固定使用 xz 壓縮 (.tar.xz)
pub type Decompressed<R> = StageReader<XzDecoder<R>>;

/// 以串流方式解壓：解碼器只持有一個區塊的緩衝，資料一解出就交給下游
pub fn wrap<R: Read>(stream: R) -> Result<Decompressed<R>> {
    let decoder = Stream::new_stream_decoder(u64::MAX, CONCATENATED).map_err(|e| {
        ProvisionError::DecompressError {
            message: format!("failed to initialize xz decoder: {}", e),
        }
    })?;

    Ok(StageReader::new(
        XzDecoder::new_stream(stream, decoder),
        Stage::Decompress,
    ))
}

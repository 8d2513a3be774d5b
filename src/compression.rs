//! Record payload compression: the four compression types carried in a
//! record header's compression word.

use std::io::{Read, Write};

use crate::error::{EvioError, Result};
use crate::types::CompressionType;

pub fn compress(kind: CompressionType, src: &[u8]) -> Result<Vec<u8>> {
    match kind {
        CompressionType::None => Ok(src.to_vec()),
        CompressionType::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(src).map_err(|e| EvioError::CompressionFailed(e.to_string()))?;
            encoder.finish().map_err(|e| EvioError::CompressionFailed(e.to_string()))
        }
        CompressionType::Lz4Fast => lz4_compress(src, 0),
        CompressionType::Lz4Best => lz4_compress(src, 16),
    }
}

pub fn decompress(kind: CompressionType, src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    match kind {
        CompressionType::None => Ok(src.to_vec()),
        CompressionType::Gzip => {
            let mut decoder = flate2::read::GzDecoder::new(src);
            let mut out = Vec::with_capacity(expected_len);
            decoder.read_to_end(&mut out).map_err(|e| EvioError::DecompressionFailed(e.to_string()))?;
            Ok(out)
        }
        CompressionType::Lz4Fast | CompressionType::Lz4Best => lz4_decompress(src, expected_len),
    }
}

fn lz4_compress(src: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = lz4::EncoderBuilder::new()
        .level(level)
        .build(Vec::new())
        .map_err(|e| EvioError::CompressionFailed(e.to_string()))?;
    encoder.write_all(src).map_err(|e| EvioError::CompressionFailed(e.to_string()))?;
    let (out, result) = encoder.finish();
    result.map_err(|e| EvioError::CompressionFailed(e.to_string()))?;
    Ok(out)
}

fn lz4_decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoder = lz4::Decoder::new(src).map_err(|e| EvioError::DecompressionFailed(e.to_string()))?;
    let mut out = Vec::with_capacity(expected_len);
    decoder.read_to_end(&mut out).map_err(|e| EvioError::DecompressionFailed(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let data = b"raw payload bytes".to_vec();
        let compressed = compress(CompressionType::None, &data).unwrap();
        assert_eq!(compressed, data);
        let decompressed = decompress(CompressionType::None, &compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn gzip_round_trips() {
        let data = vec![42u8; 4096];
        let compressed = compress(CompressionType::Gzip, &data).unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = decompress(CompressionType::Gzip, &compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn lz4_fast_and_best_round_trip() {
        let data: Vec<u8> = (0..2000).map(|i| (i % 251) as u8).collect();
        for kind in [CompressionType::Lz4Fast, CompressionType::Lz4Best] {
            let compressed = compress(kind, &data).unwrap();
            let decompressed = decompress(kind, &compressed, data.len()).unwrap();
            assert_eq!(decompressed, data);
        }
    }
}

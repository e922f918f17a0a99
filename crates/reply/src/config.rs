use crate::encoding::Encoding;
use serde::{Deserialize, Serialize};

/// Transmitter settings, loadable from any serde format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitConfig {
    /// candidate content codings, in server preference order
    pub encodings: Vec<Encoding>,
    /// flate2 compression level, 0 to 9
    pub compression_level: u32,
    /// write buffer of connections created through the transmitter
    pub write_buffer: usize,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            encodings: vec![Encoding::Gzip, Encoding::Deflate, Encoding::Identity],
            compression_level: 6,
            write_buffer: 8 * 1024,
        }
    }
}

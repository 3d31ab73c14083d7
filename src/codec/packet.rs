//! Compressed packet framing.
//!
//! Layout: 6-byte magic, 1-byte flag, payload. The payload is stored raw
//! when the source is shorter than the threshold, zlib-deflated otherwise.

use std::io::{Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

pub const MAGIC_HEADER: [u8; 6] = [49, 46, 88, 122, 76, 67];
pub const FLAG_NO_COMPRESSION: u8 = 0x0;
pub const FLAG_ZLIB: u8 = 0xF;

/// Smallest valid packet: magic plus flag.
pub const HEADER_LEN: usize = MAGIC_HEADER.len() + 1;
/// Sources shorter than this are stored raw.
pub const DEFAULT_THRESHOLD: usize = 384;
pub const DEFAULT_LEVEL: u32 = 6;
/// Inflated payloads larger than this are rejected.
pub const DEFAULT_MAX_OUTPUT: usize = 1024 * 1024;

/// Options for packet compression and decompression.
#[derive(Debug, Clone)]
pub struct ZOptions {
    pub token: Option<CancellationToken>,
    pub level: u32,
    pub threshold: usize,
    pub max_output: usize,
}

impl Default for ZOptions {
    fn default() -> Self {
        Self {
            token: None,
            level: DEFAULT_LEVEL,
            threshold: DEFAULT_THRESHOLD,
            max_output: DEFAULT_MAX_OUTPUT,
        }
    }
}

impl ZOptions {
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn with_max_output(mut self, max_output: usize) -> Self {
        self.max_output = max_output;
        self
    }

    fn ensure_not_cancelled(&self, what: &str) -> Result<()> {
        match &self.token {
            Some(t) if t.is_cancelled() => Err(AppError::TokenCancelled(format!(
                "Packet {} was cancelled by token",
                what
            ))),
            _ => Ok(()),
        }
    }

    /// Runs `work` on the blocking pool, racing it against the token.
    async fn run<F>(&self, what: &'static str, work: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> std::io::Result<Vec<u8>> + Send + 'static,
    {
        let task = tokio::task::spawn_blocking(work);

        let joined = match &self.token {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    return Err(AppError::TokenCancelled(format!(
                        "Packet {} was cancelled by token",
                        what
                    )));
                }
                res = task => res,
            },
            None => task.await,
        };

        let output = joined
            .map_err(|e| AppError::Internal(format!("Packet {} task failed: {}", what, e)))?
            .map_err(|e| AppError::InvalidArgument(format!("Packet {} failed: {}", what, e)))?;

        // A result produced after cancellation is never handed out.
        self.ensure_not_cancelled(what)?;
        Ok(output)
    }
}

fn frame(flag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC_HEADER);
    out.push(flag);
    out.extend_from_slice(payload);
    out
}

/// Drains `source` and frames it as a compressed packet.
///
/// # Arguments
///
/// * `source` - Any async byte source (a slice, a file, a `BufferReader`).
/// * `options` - Threshold, deflate level and optional cancellation token.
///
/// # Returns
///
/// The framed packet, or `ERR_TOKEN_CANCELLED` if the token fires first.
pub async fn create_compressed_packet<R>(mut source: R, options: &ZOptions) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + Send,
{
    options.ensure_not_cancelled("compression")?;

    let mut buffer = Vec::new();
    source.read_to_end(&mut buffer).await?;

    options.ensure_not_cancelled("compression")?;

    if buffer.len() < options.threshold {
        return Ok(frame(FLAG_NO_COMPRESSION, &buffer));
    }

    let level = Compression::new(options.level.min(9));
    let deflated = options
        .run("compression", move || {
            let mut encoder = ZlibEncoder::new(Vec::with_capacity(buffer.len() / 2), level);
            encoder.write_all(&buffer)?;
            encoder.finish()
        })
        .await?;

    Ok(frame(FLAG_ZLIB, &deflated))
}

/// Validates the frame of `packet` and returns the original bytes.
pub async fn decompress_packet(packet: &[u8], options: &ZOptions) -> Result<Vec<u8>> {
    options.ensure_not_cancelled("decompression")?;

    if packet.len() < HEADER_LEN {
        return Err(AppError::InvalidArgument(format!(
            "Compressed packet must be at least {} bytes, got {}",
            HEADER_LEN,
            packet.len()
        )));
    }

    if packet[..MAGIC_HEADER.len()] != MAGIC_HEADER {
        return Err(AppError::MagicNumberMismatch);
    }

    let payload = &packet[HEADER_LEN..];

    match packet[MAGIC_HEADER.len()] {
        FLAG_NO_COMPRESSION => Ok(payload.to_vec()),
        FLAG_ZLIB => {
            let payload = payload.to_vec();
            let limit = options.max_output;
            let out = options
                .run("decompression", move || {
                    let mut out = Vec::with_capacity((payload.len() * 2).min(limit));
                    ZlibDecoder::new(payload.as_slice())
                        .take(limit as u64 + 1)
                        .read_to_end(&mut out)?;
                    Ok(out)
                })
                .await?;

            if out.len() > limit {
                return Err(AppError::InvalidArgument(format!(
                    "Decompressed packet exceeds {} bytes",
                    limit
                )));
            }
            Ok(out)
        }
        flag => Err(AppError::UnknownPacketFlag(flag)),
    }
}

/// Returns the flag byte of a framed packet, if it has one.
pub fn packet_flag(packet: &[u8]) -> Option<u8> {
    (packet.len() >= HEADER_LEN && packet[..MAGIC_HEADER.len()] == MAGIC_HEADER)
        .then(|| packet[MAGIC_HEADER.len()])
}

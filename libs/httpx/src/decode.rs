//! Response body decoding by `Content-Encoding`.

use crate::error::HttpError;
use bytes::Bytes;
use std::io::Read;

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Compression scheme declared by a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    /// No transformation (`identity`, `none`, empty or unrecognized)
    Identity,
    /// `gzip` / `x-gzip`
    Gzip,
    /// `br`
    Brotli,
    /// `deflate` (zlib-wrapped)
    Deflate,
}

impl ContentEncoding {
    /// Map a header value to an encoding; matching is case-insensitive and
    /// anything unrecognized is treated as identity.
    #[must_use]
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Self::Gzip,
            "br" => Self::Brotli,
            "deflate" => Self::Deflate,
            _ => Self::Identity,
        }
    }

    /// Lowercase token for diagnostics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Brotli => "br",
            Self::Deflate => "deflate",
        }
    }
}

/// Decode `body` according to `encoding`.
///
/// # Errors
/// Returns `HttpError::Decompression` if the payload is not valid for the
/// declared encoding. No partially decoded data is returned.
pub fn decode_body(encoding: ContentEncoding, body: Bytes) -> Result<Bytes, HttpError> {
    if body.is_empty() {
        return Ok(body);
    }

    let mut decoded = Vec::with_capacity(body.len().saturating_mul(2));
    let result = match encoding {
        ContentEncoding::Identity => return Ok(body),
        ContentEncoding::Gzip => flate2::read::GzDecoder::new(&body[..]).read_to_end(&mut decoded),
        ContentEncoding::Deflate => {
            flate2::read::ZlibDecoder::new(&body[..]).read_to_end(&mut decoded)
        }
        ContentEncoding::Brotli => {
            brotli::Decompressor::new(&body[..], BROTLI_BUFFER_SIZE).read_to_end(&mut decoded)
        }
    };

    result.map_err(|source| HttpError::Decompression {
        encoding: encoding.as_str().to_owned(),
        source,
    })?;

    tracing::trace!(
        encoding = encoding.as_str(),
        wire_bytes = body.len(),
        decoded_bytes = decoded.len(),
        "decoded response body"
    );

    Ok(Bytes::from(decoded))
}

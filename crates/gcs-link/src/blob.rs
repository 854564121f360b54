//! Tagged numeric arrays carried over the chunked transport.
//!
//! Layout: one JSON header line (`tag`, `shape`, `dtype`) terminated by
//! `\n`, followed by the values as little-endian `f64`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DTYPE_F64: &str = "f64";

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob header is missing its terminator")]
    MissingHeader,
    #[error("invalid blob header: {0}")]
    Header(#[from] serde_json::Error),
    #[error("unsupported dtype {0}")]
    Dtype(String),
    #[error("shape {shape:?} needs {expected} bytes, got {actual}")]
    Length {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("rows have uneven widths")]
    Ragged,
}

#[derive(Debug, Serialize, Deserialize)]
struct BlobHeader {
    tag: String,
    shape: Vec<usize>,
    dtype: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayBlob {
    pub tag: String,
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl ArrayBlob {
    /// One-dimensional array.
    pub fn from_values(tag: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            tag: tag.into(),
            shape: vec![values.len()],
            values,
        }
    }

    /// Two-dimensional array from equally wide rows.
    pub fn from_rows(tag: impl Into<String>, rows: &[Vec<f64>]) -> Result<Self, BlobError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != width) {
            return Err(BlobError::Ragged);
        }
        Ok(Self {
            tag: tag.into(),
            shape: vec![rows.len(), width],
            values: rows.iter().flatten().copied().collect(),
        })
    }

    /// Values split into rows along the last axis.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        let width = match self.shape.as_slice() {
            [] => return Vec::new(),
            [_] => 1,
            dims => dims[dims.len() - 1],
        };
        if width == 0 {
            return Vec::new();
        }
        self.values.chunks(width).map(<[f64]>::to_vec).collect()
    }

    pub fn encode(&self) -> Result<Vec<u8>, BlobError> {
        let header = BlobHeader {
            tag: self.tag.clone(),
            shape: self.shape.clone(),
            dtype: DTYPE_F64.to_string(),
        };
        let mut out = serde_json::to_vec(&header)?;
        out.push(b'\n');
        out.reserve(self.values.len() * 8);
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BlobError> {
        let split = bytes
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(BlobError::MissingHeader)?;
        let header: BlobHeader = serde_json::from_slice(&bytes[..split])?;
        if header.dtype != DTYPE_F64 {
            return Err(BlobError::Dtype(header.dtype));
        }

        let body = &bytes[split + 1..];
        let expected = header.shape.iter().product::<usize>() * 8;
        if body.len() != expected {
            return Err(BlobError::Length {
                shape: header.shape,
                expected,
                actual: body.len(),
            });
        }

        let values = body
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect();
        Ok(Self {
            tag: header.tag,
            shape: header.shape,
            values,
        })
    }
}

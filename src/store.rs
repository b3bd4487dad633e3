//! On-disk artifact for a fitted [`OverstayPipeline`].
//!
//! # Layout
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     Magic ("OVSP")
//! 4       1     Version major
//! 5       1     Version minor
//! 6       2     Reserved
//! 8       4     Payload size (bytes, LE)
//! 12      4     Number of features (LE)
//! 16      ..    Postcard-encoded pipeline
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{features::N_FEATURES, pipeline::OverstayPipeline};

pub const DEFAULT_MODEL_PATH: &str = "models/overstay_model.bin";

pub const MAGIC: &[u8; 4] = b"OVSP";
pub const VERSION_MAJOR: u8 = 1;
pub const VERSION_MINOR: u8 = 0;
pub const HEADER_SIZE: usize = 16;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("encoding error: {0}")]
    Encoding(#[from] postcard::Error),
}

/// Why an artifact that exists could not be used.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("not an overstay model artifact")]
    NotAnArtifact,

    #[error("artifact format {major}.{minor} is newer than this build supports")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("artifact truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("artifact was built for {found} features, expected {expected}")]
    FeatureMismatch { expected: usize, found: usize },

    #[error("corrupt payload: {0}")]
    CorruptPayload(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result of looking for an artifact at startup.
#[derive(Debug)]
pub enum LoadOutcome {
    Found(OverstayPipeline),
    NotFound,
    Corrupt(ArtifactError),
}

/// Writes the artifact, replacing any previous one only once the new bytes
/// are fully on disk.
pub fn save(pipeline: &OverstayPipeline, path: &Path) -> Result<(), StoreError> {
    let bytes = encode(pipeline)?;
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let tmp = tmp_path(path);
    fs::write(&tmp, &bytes).map_err(io_err)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(io_err(e));
    }
    tracing::info!("saved model artifact ({} bytes) to {}", bytes.len(), path.display());
    Ok(())
}

pub fn load(path: &Path) -> LoadOutcome {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return LoadOutcome::NotFound,
        Err(e) => return LoadOutcome::Corrupt(e.into()),
    };
    match decode(&bytes) {
        Ok(p) => LoadOutcome::Found(p),
        Err(e) => LoadOutcome::Corrupt(e),
    }
}

pub fn encode(pipeline: &OverstayPipeline) -> Result<Vec<u8>, StoreError> {
    let payload = postcard::to_allocvec(pipeline)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_MAJOR);
    buf.push(VERSION_MINOR);
    buf.extend_from_slice(&[0, 0]);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(pipeline.n_features() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub fn decode(bytes: &[u8]) -> Result<OverstayPipeline, ArtifactError> {
    if bytes.len() < HEADER_SIZE {
        if !bytes.starts_with(&MAGIC[..bytes.len().min(4)]) {
            return Err(ArtifactError::NotAnArtifact);
        }
        return Err(ArtifactError::Truncated {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    if &bytes[0..4] != MAGIC {
        return Err(ArtifactError::NotAnArtifact);
    }
    let (major, minor) = (bytes[4], bytes[5]);
    if major > VERSION_MAJOR {
        return Err(ArtifactError::UnsupportedVersion { major, minor });
    }
    let payload_size = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let num_features = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]) as usize;
    if num_features != N_FEATURES {
        return Err(ArtifactError::FeatureMismatch {
            expected: N_FEATURES,
            found: num_features,
        });
    }
    let payload = &bytes[HEADER_SIZE..];
    if payload.len() < payload_size {
        return Err(ArtifactError::Truncated {
            expected: HEADER_SIZE + payload_size,
            actual: bytes.len(),
        });
    }
    let pipeline: OverstayPipeline = postcard::from_bytes(&payload[..payload_size])
        .map_err(|e| ArtifactError::CorruptPayload(e.to_string()))?;
    pipeline
        .tree()
        .validate()
        .map_err(ArtifactError::CorruptPayload)?;
    Ok(pipeline)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

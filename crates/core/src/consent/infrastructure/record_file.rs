use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::consent::domain::record::{consent_filename, parse_consent_path};
use crate::shared::constants::CAPTURE_JPEG_QUALITY;
use crate::shared::frame::Frame;

const SIDECAR_EXTENSION: &str = "json";
const SIDECAR_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Embedding sidecar stored next to the capture image so restarts do not
/// re-run face detection on every consent photo.
#[derive(Debug, Deserialize, Serialize)]
struct Sidecar {
    name: String,
    granted_at: String,
    embedding: Vec<f32>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecordFileError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("sidecar error: {0}")]
    Sidecar(#[from] serde_json::Error),
    #[error("not a consent capture filename: {0}")]
    BadFilename(PathBuf),
    #[error("capture frame is not 3-channel RGB")]
    BadFrame,
}

/// A capture file read back from disk. The embedding comes from the
/// sidecar when one exists; otherwise the decoded image is returned so the
/// caller can re-embed.
#[derive(Debug)]
pub struct LoadedRecord {
    pub name: String,
    pub granted_at: NaiveDateTime,
    pub embedding: Option<Vec<f32>>,
    pub image: Option<Frame>,
}

/// Writes a consent capture: the head crop as a JPEG plus the embedding
/// sidecar. The sidecar lands first; the watcher keys on the `.jpg`, so a
/// record is never visible before its embedding is readable.
pub fn save_record(
    dir: &Path,
    name: &str,
    granted_at: NaiveDateTime,
    image: &Frame,
    embedding: &[f32],
) -> Result<PathBuf, RecordFileError> {
    if image.channels() != 3 {
        return Err(RecordFileError::BadFrame);
    }
    fs::create_dir_all(dir)?;

    let jpg_path = dir.join(consent_filename(name, granted_at));
    let sidecar = Sidecar {
        name: name.to_string(),
        granted_at: granted_at.format(SIDECAR_TIMESTAMP_FORMAT).to_string(),
        embedding: embedding.to_vec(),
    };
    fs::write(
        sidecar_path(&jpg_path),
        serde_json::to_vec_pretty(&sidecar)?,
    )?;

    let rgb = RgbImage::from_raw(image.width(), image.height(), image.data().to_vec())
        .ok_or(RecordFileError::BadFrame)?;
    let writer = BufWriter::new(File::create(&jpg_path)?);
    let encoder = JpegEncoder::new_with_quality(writer, CAPTURE_JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;

    log::info!("Saved consent capture: {}", jpg_path.display());
    Ok(jpg_path)
}

/// Reads a capture back. Prefers the sidecar embedding; a capture dropped
/// into the directory by hand (no sidecar) is decoded for re-embedding.
pub fn load_record(jpg_path: &Path) -> Result<LoadedRecord, RecordFileError> {
    let (granted_at, name) = parse_consent_path(jpg_path)
        .ok_or_else(|| RecordFileError::BadFilename(jpg_path.to_path_buf()))?;

    let sidecar = sidecar_path(jpg_path);
    if sidecar.is_file() {
        match serde_json::from_slice::<Sidecar>(&fs::read(&sidecar)?) {
            Ok(parsed) if !parsed.embedding.is_empty() => {
                return Ok(LoadedRecord {
                    name,
                    granted_at,
                    embedding: Some(parsed.embedding),
                    image: None,
                });
            }
            Ok(_) => log::warn!("Empty embedding in sidecar: {}", sidecar.display()),
            Err(err) => log::warn!("Unreadable sidecar {}: {err}", sidecar.display()),
        }
    }

    let rgb = image::open(jpg_path)?.into_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(LoadedRecord {
        name,
        granted_at,
        embedding: None,
        image: Some(Frame::new(rgb.into_raw(), width, height, 3)),
    })
}

/// Deletes the sidecar belonging to a removed capture, if any remains.
pub fn remove_sidecar(jpg_path: &Path) {
    let sidecar = sidecar_path(jpg_path);
    if sidecar.is_file() {
        if let Err(err) = fs::remove_file(&sidecar) {
            log::warn!("Failed to remove sidecar {}: {err}", sidecar.display());
        }
    }
}

fn sidecar_path(jpg_path: &Path) -> PathBuf {
    jpg_path.with_extension(SIDECAR_EXTENSION)
}

//! Image capture and object storage
//!
//! Capture-then-upload boundary for the front camera. The concrete binding
//! drives the actual camera and bucket upload; the simulated store fabricates
//! stable URLs for tests and hardware-free runs.

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Where an uploaded image ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// Publicly reachable URL of the uploaded image
    pub public_url: String,
    /// Storage URI of the same object (`gs://bucket/object`)
    pub storage_uri: String,
}

/// Capture and upload interface for the front camera
#[async_trait]
pub trait ImageStore: Send {
    /// Capture one image, returning its local path
    async fn capture(&mut self) -> Result<PathBuf>;

    /// Upload a captured image and remove the local file
    async fn upload(&mut self, path: &Path) -> Result<ImageUpload>;
}

/// Image file name for a capture instant
///
/// Colons and spaces are stripped so the name is safe as an object key.
pub fn image_file_name(captured_at: DateTime<Utc>) -> String {
    let stamp = captured_at
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
        .replace(':', "")
        .replace(' ', "");
    format!("image{}.jpg", stamp)
}

/// Simulated image store
///
/// Produces capture paths with the real naming scheme and upload URLs shaped
/// like the production bucket's, without touching a camera or the network.
pub struct SimulatedImageStore {
    bucket: String,
    pub captures: u32,
}

impl SimulatedImageStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            captures: 0,
        }
    }
}

#[async_trait]
impl ImageStore for SimulatedImageStore {
    async fn capture(&mut self) -> Result<PathBuf> {
        self.captures += 1;
        Ok(PathBuf::from(image_file_name(Utc::now())))
    }

    async fn upload(&mut self, path: &Path) -> Result<ImageUpload> {
        let name = path.to_string_lossy();
        Ok(ImageUpload {
            public_url: format!("https://storage.googleapis.com/{}/{}", self.bucket, name),
            storage_uri: format!("gs://{}/{}", self.bucket, name),
        })
    }
}

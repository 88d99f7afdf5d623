//! src/services/ingest_service.rs
//!
//! IngestService: the upload and deletion pipeline over an [`ImageStore`].
//!
//! Uploads pass through a fixed sequence of gates:
//!
//! 1. size ceiling, before any decoding work
//! 2. fingerprint of the raw bytes and an early duplicate check
//! 3. normalization to RGBA8 PNG
//! 4. fingerprint of the normalized bytes and the authoritative duplicate check
//! 5. persist under the normalized fingerprint
//!
//! Any gate may reject; nothing is written unless all of them pass. The
//! check-then-create window in steps 4–5 is not locked: two racing uploads of
//! the same new image write byte-identical files under the same name.

use crate::{
    models::{fingerprint::Fingerprint, identity::Identity},
    services::{
        image_store::{ImageStore, StoreError},
        normalizer::{self, NormalizeError},
    },
};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Largest accepted upload (256 MiB).
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("image too large (>256MiB)")]
    PayloadTooLarge { size: usize, limit: usize },
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("duplicate image")]
    Duplicate(String),
    #[error("nonexistent image: {0}")]
    NotFound(String),
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: StoreError,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

/// Progress of a single upload through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    SizeChecked,
    RawHashed,
    RawDedupChecked,
    Normalized,
    FinalHashed,
    FinalDedupChecked,
    Persisted,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A successfully stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub fingerprint: Fingerprint,
    pub filename: String,
}

impl Ingested {
    /// Public URL of the image given a `<scheme>://<host>/<subpath/>` prefix.
    pub fn locator(&self, url_prefix: &str) -> String {
        format!("{}{}", url_prefix, self.filename)
    }
}

#[derive(Clone, Debug)]
pub struct IngestService {
    store: ImageStore,
    max_upload_bytes: usize,
}

impl IngestService {
    pub fn new(store: ImageStore) -> Self {
        Self {
            store,
            max_upload_bytes: MAX_UPLOAD_BYTES,
        }
    }

    /// Override the size ceiling. Used by tests to exercise the limit without
    /// allocating hundreds of megabytes.
    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Run an upload through every gate and persist it.
    pub async fn ingest(&self, body: Vec<u8>, who: &Identity) -> Result<Ingested, IngestError> {
        let result = self.run_ingest(body, who).await;
        match &result {
            Ok(ingested) => info!(user = %who.login, file = %ingested.filename, "successful upload"),
            Err(err) => warn!(user = %who.login, error = %err, "upload rejected"),
        }
        result
    }

    async fn run_ingest(&self, body: Vec<u8>, who: &Identity) -> Result<Ingested, IngestError> {
        trace_stage(who, IngestStage::Received, body.len());

        check_size(body.len(), self.max_upload_bytes)?;
        trace_stage(who, IngestStage::SizeChecked, body.len());

        let raw = Fingerprint::of(&body);
        trace_stage(who, IngestStage::RawHashed, body.len());

        self.reject_duplicate(&raw).await?;
        trace_stage(who, IngestStage::RawDedupChecked, body.len());

        let uploader = who.clone();
        let (encoded, fingerprint) = tokio::task::spawn_blocking(move || {
            let canonical = normalizer::normalize(&body)?;
            trace_stage(&uploader, IngestStage::Normalized, canonical.encoded.len());
            let fingerprint = Fingerprint::of(&canonical.encoded);
            trace_stage(&uploader, IngestStage::FinalHashed, canonical.encoded.len());
            Ok::<_, NormalizeError>((canonical.encoded, fingerprint))
        })
        .await
        .map_err(|err| IngestError::Internal(err.to_string()))??;

        self.reject_duplicate(&fingerprint).await?;
        trace_stage(who, IngestStage::FinalDedupChecked, encoded.len());
        let size = encoded.len();

        let filename = fingerprint.filename();
        self.store
            .create(&fingerprint, encoded)
            .await
            .map_err(|source| IngestError::Io {
                context: format!("error writing {}", filename),
                source,
            })?;
        trace_stage(who, IngestStage::Persisted, size);

        Ok(Ingested {
            fingerprint,
            filename,
        })
    }

    async fn reject_duplicate(&self, fp: &Fingerprint) -> Result<(), IngestError> {
        let exists = self.store.exists(fp).await.map_err(|source| IngestError::Io {
            context: format!("error checking {}", fp.filename()),
            source,
        })?;
        if exists {
            return Err(IngestError::Duplicate(fp.filename()));
        }
        Ok(())
    }

    /// Delete a stored image by the hex fingerprint a client supplied.
    ///
    /// Text that is not a canonical fingerprint cannot name a stored object,
    /// so it is reported the same way as an absent one.
    pub async fn delete(&self, hash: &str, who: &Identity) -> Result<(), IngestError> {
        let result = self.run_delete(hash).await;
        match &result {
            Ok(()) => info!(user = %who.login, file = %format!("{}.png", hash), "successful deletion"),
            Err(err) => warn!(user = %who.login, error = %err, "deletion rejected"),
        }
        result
    }

    async fn run_delete(&self, hash: &str) -> Result<(), IngestError> {
        let fp: Fingerprint = hash
            .parse()
            .map_err(|_| IngestError::NotFound(format!("{}.png", hash)))?;
        let filename = fp.filename();

        let exists = self.store.exists(&fp).await.map_err(|source| IngestError::Io {
            context: format!("error checking {}", filename),
            source,
        })?;
        if !exists {
            return Err(IngestError::NotFound(filename));
        }

        match self.store.remove(&fp).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound(name)) => Err(IngestError::NotFound(name)),
            Err(source) => Err(IngestError::Io {
                context: format!("error deleting {}", filename),
                source,
            }),
        }
    }
}

/// Reject bodies strictly larger than `limit`.
pub fn check_size(size: usize, limit: usize) -> Result<(), IngestError> {
    if size > limit {
        return Err(IngestError::PayloadTooLarge { size, limit });
    }
    Ok(())
}

fn trace_stage(who: &Identity, stage: IngestStage, bytes: usize) {
    debug!(user = %who.login, %stage, bytes, "ingest stage reached");
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{
        ExtendedColorType, ImageBuffer, ImageEncoder, Rgb, Rgba, RgbaImage,
        codecs::{
            jpeg::JpegEncoder,
            png::{CompressionType, FilterType, PngEncoder},
        },
    };
    use tempfile::TempDir;

    async fn service() -> (TempDir, IngestService) {
        let dir = TempDir::new().unwrap();
        let store = ImageStore::open(dir.path()).await.unwrap();
        (dir, IngestService::new(store))
    }

    fn who() -> Identity {
        Identity::new("tester")
    }

    fn pattern() -> RgbaImage {
        ImageBuffer::from_fn(24, 24, |x, y| {
            Rgba([(x * 10) as u8, (y * 10) as u8, ((x * y) % 256) as u8, 255])
        })
    }

    fn png_with(pixels: &RgbaImage, filter: FilterType) -> Vec<u8> {
        let mut out = Vec::new();
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, filter)
            .write_image(
                pixels.as_raw(),
                pixels.width(),
                pixels.height(),
                ExtendedColorType::Rgba8,
            )
            .unwrap();
        out
    }

    fn jpeg() -> Vec<u8> {
        let rgb = ImageBuffer::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 128]));
        let mut out = Vec::new();
        JpegEncoder::new(&mut out)
            .write_image(rgb.as_raw(), 32, 32, ExtendedColorType::Rgb8)
            .unwrap();
        out
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(check_size(MAX_UPLOAD_BYTES, MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            check_size(MAX_UPLOAD_BYTES + 1, MAX_UPLOAD_BYTES),
            Err(IngestError::PayloadTooLarge { .. })
        ));
        assert!(check_size(0, MAX_UPLOAD_BYTES).is_ok());
    }

    #[test]
    fn locator_appends_filename_to_prefix() {
        let fp = Fingerprint::of(b"x");
        let ingested = Ingested {
            fingerprint: fp,
            filename: fp.filename(),
        };
        assert_eq!(
            ingested.locator("https://img.example.org/sub/"),
            format!("https://img.example.org/sub/{}.png", fp)
        );
    }

    #[tokio::test]
    async fn accepted_upload_is_stored_under_normalized_fingerprint() {
        let (_dir, svc) = service().await;
        let upload = jpeg();

        let ingested = svc.ingest(upload.clone(), &who()).await.unwrap();
        let stored = svc.store().read(&ingested.fingerprint).await.unwrap();

        assert_eq!(Fingerprint::of(&stored), ingested.fingerprint);
        assert_ne!(Fingerprint::of(&upload), ingested.fingerprint);
        assert_eq!(ingested.filename, format!("{}.png", ingested.fingerprint));
    }

    #[tokio::test]
    async fn stored_object_decodes_to_canonical_pixels() {
        let (_dir, svc) = service().await;
        let upload = jpeg();
        let canonical = normalizer::normalize(&upload).unwrap();

        let ingested = svc.ingest(upload, &who()).await.unwrap();
        let stored = svc.store().read(&ingested.fingerprint).await.unwrap();
        let decoded = normalizer::decode(&stored).unwrap().to_rgba8();

        assert_eq!(decoded, canonical.pixels);
    }

    #[tokio::test]
    async fn identical_bytes_are_duplicates() {
        let (_dir, svc) = service().await;
        let upload = jpeg();

        svc.ingest(upload.clone(), &who()).await.unwrap();
        let err = svc.ingest(upload, &who()).await.unwrap_err();
        assert!(matches!(err, IngestError::Duplicate(_)), "{err:?}");
    }

    #[tokio::test]
    async fn raw_fingerprint_match_is_rejected_before_decoding() {
        let (_dir, svc) = service().await;
        let garbage = b"not an image, but already stored under its own hash".to_vec();
        svc.store()
            .create(&Fingerprint::of(&garbage), garbage.clone())
            .await
            .unwrap();

        // Would be a decode error if the raw check were skipped.
        let err = svc.ingest(garbage.clone(), &who()).await.unwrap_err();
        match err {
            IngestError::Duplicate(name) => assert_eq!(name, Fingerprint::of(&garbage).filename()),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stored_png_bytes_are_duplicates_of_themselves() {
        let (_dir, svc) = service().await;
        let ingested = svc.ingest(jpeg(), &who()).await.unwrap();
        let stored = svc.store().read(&ingested.fingerprint).await.unwrap();
        assert_eq!(Fingerprint::of(&stored), ingested.fingerprint);

        let err = svc.ingest(stored, &who()).await.unwrap_err();
        match err {
            IngestError::Duplicate(name) => assert_eq!(name, ingested.filename),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pixel_identical_encodings_are_duplicates() {
        let (_dir, svc) = service().await;
        let pixels = pattern();
        let first = png_with(&pixels, FilterType::NoFilter);
        let second = png_with(&pixels, FilterType::Sub);
        assert_ne!(Fingerprint::of(&first), Fingerprint::of(&second));

        let stored = svc.ingest(first, &who()).await.unwrap();
        let err = svc.ingest(second, &who()).await.unwrap_err();
        match err {
            IngestError::Duplicate(name) => assert_eq!(name, stored.filename),
            other => panic!("expected duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_image_is_rejected_and_nothing_is_written() {
        let (dir, svc) = service().await;
        let err = svc
            .ingest(b"hello, this is text".to_vec(), &who())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Normalize(NormalizeError::Decode(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_decoding() {
        let (dir, svc) = service().await;
        let svc = svc.with_max_upload_bytes(16);

        // Garbage would be a decode error if it ever reached the normalizer.
        let err = svc.ingest(vec![0u8; 17], &who()).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::PayloadTooLarge { size: 17, limit: 16 }
        ));

        let err = svc.ingest(vec![0u8; 16], &who()).await.unwrap_err();
        assert!(matches!(err, IngestError::Normalize(NormalizeError::Decode(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn delete_lifecycle() {
        let (_dir, svc) = service().await;
        let ingested = svc.ingest(jpeg(), &who()).await.unwrap();
        let hash = ingested.fingerprint.to_string();

        svc.delete(&hash, &who()).await.unwrap();
        assert!(!svc.store().exists(&ingested.fingerprint).await.unwrap());

        let err = svc.delete(&hash, &who()).await.unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
    }

    #[tokio::test]
    async fn deleting_unknown_or_malformed_hash_is_not_found() {
        let (_dir, svc) = service().await;

        let never = Fingerprint::of(b"never stored").to_string();
        assert!(matches!(
            svc.delete(&never, &who()).await,
            Err(IngestError::NotFound(_))
        ));

        match svc.delete("../Cargo", &who()).await {
            Err(IngestError::NotFound(name)) => assert_eq!(name, "../Cargo.png"),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn reupload_after_delete_is_accepted() {
        let (_dir, svc) = service().await;
        let upload = jpeg();
        let first = svc.ingest(upload.clone(), &who()).await.unwrap();
        svc.delete(&first.fingerprint.to_string(), &who()).await.unwrap();

        let second = svc.ingest(upload, &who()).await.unwrap();
        assert_eq!(first, second);
    }
}

//! src/services/image_store.rs
//!
//! ImageStore: the content-addressed namespace on disk. One flat directory
//! whose entries are `{fingerprint}.png`. Every operation is keyed by a
//! [`Fingerprint`], never by a caller-supplied path, so nothing can be read or
//! written outside the root.

use crate::models::fingerprint::Fingerprint;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("image `{0}` not found")]
    NotFound(String),
    #[error("storage root `{0}` is not a directory")]
    NotADirectory(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Name prefix of in-flight writes. Never a valid object name.
const TEMP_PREFIX: &str = ".tmp-";

/// Handle on the storage root. Cheap to clone; holds no open descriptors.
#[derive(Clone, Debug)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    /// Bind a store to `root`, creating the directory if it does not exist.
    ///
    /// Temp files left behind by an interrupted write are removed.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        let meta = fs::metadata(&root).await?;
        if !meta.is_dir() {
            return Err(StoreError::NotADirectory(root.display().to_string()));
        }
        let store = Self { root };
        store.sweep_temp_files().await?;
        Ok(store)
    }

    async fn sweep_temp_files(&self) -> StoreResult<()> {
        let mut dir = fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            if !name.to_string_lossy().starts_with(TEMP_PREFIX) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => debug!("swept stale {}", entry.path().display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(StoreError::Io(err)),
            }
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, fp: &Fingerprint) -> PathBuf {
        self.root.join(fp.filename())
    }

    fn temp_path(&self) -> PathBuf {
        self.root.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()))
    }

    /// True iff `{fp}.png` is present in the root.
    pub async fn exists(&self, fp: &Fingerprint) -> StoreResult<bool> {
        match fs::metadata(self.object_path(fp)).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Write `bytes` as `{fp}.png`.
    ///
    /// The payload lands in a hidden temp file first and is renamed into
    /// place, so readers never see a partial image. An existing object with
    /// the same name is replaced; callers dedup before calling this.
    ///
    /// The write runs on its own task and finishes (or cleans up after
    /// itself) even if the caller's future is dropped halfway.
    pub async fn create(&self, fp: &Fingerprint, bytes: impl Into<Vec<u8>>) -> StoreResult<()> {
        let tmp_path = self.temp_path();
        let final_path = self.object_path(fp);
        let bytes = bytes.into();

        tokio::spawn(async move {
            if let Err(err) = write_synced(&tmp_path, &bytes).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
            if let Err(err) = fs::rename(&tmp_path, &final_path).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
            debug!("stored {}", final_path.display());
            Ok(())
        })
        .await
        .map_err(|err| {
            warn!(error = %err, "store write task failed");
            StoreError::Io(io::Error::other(err))
        })?
    }

    /// Delete `{fp}.png`. Missing objects are `NotFound`, not I/O failures.
    pub async fn remove(&self, fp: &Fingerprint) -> StoreResult<()> {
        let path = self.object_path(fp);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("removed {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(fp.filename()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    /// Read a stored image fully into memory.
    pub async fn read(&self, fp: &Fingerprint) -> StoreResult<Vec<u8>> {
        fs::read(self.object_path(fp))
            .await
            .map_err(|err| not_found_or_io(err, fp))
    }

    /// Open a stored image for streaming.
    pub async fn open_object(&self, fp: &Fingerprint) -> StoreResult<File> {
        File::open(self.object_path(fp))
            .await
            .map_err(|err| not_found_or_io(err, fp))
    }

    /// Write, read back and delete a scratch file in the root.
    pub async fn probe(&self) -> StoreResult<()> {
        let tmp_path = self.temp_path();
        let result: io::Result<()> = async {
            write_synced(&tmp_path, b"readyz").await?;
            let bytes = fs::read(&tmp_path).await?;
            if bytes != b"readyz" {
                return Err(io::Error::new(ErrorKind::InvalidData, "file content mismatch"));
            }
            Ok(())
        }
        .await;

        let cleanup = fs::remove_file(&tmp_path).await;
        result?;
        cleanup?;
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

fn not_found_or_io(err: io::Error, fp: &Fingerprint) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(fp.filename())
    } else {
        StoreError::Io(err)
    }
}

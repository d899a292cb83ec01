//! File system placer implementing the collision policy.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::hashing::FileHasher;

use super::error::PlacerError;
use super::types::PlacementOutcome;

/// Moves files into destination directories, resolving name collisions by
/// content hash and modification time.
#[derive(Debug, Clone)]
pub struct FsPlacer {
    hasher: FileHasher,
    conflict_dir: Option<PathBuf>,
}

impl FsPlacer {
    /// Creates a placer. When `conflict_dir` is set, sources that lose a
    /// collision are moved there instead of being left in place.
    pub fn new(hasher: FileHasher, conflict_dir: Option<PathBuf>) -> Self {
        Self {
            hasher,
            conflict_dir,
        }
    }

    /// Attempts to move a file atomically (rename).
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) => {
                // Cross-filesystem moves fail with EXDEV (18 on Linux)
                if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Moves a file, falling back to copy and delete across filesystems.
    pub async fn move_file(source: &Path, destination: &Path) -> Result<(), PlacerError> {
        let moved = Self::try_atomic_move(source, destination)
            .await
            .map_err(|e| {
                PlacerError::move_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;

        if !moved {
            fs::copy(source, destination).await.map_err(|e| {
                PlacerError::move_failed(source.to_path_buf(), destination.to_path_buf(), e)
            })?;
            fs::remove_file(source)
                .await
                .map_err(|e| PlacerError::io(source, e))?;
        }

        Ok(())
    }

    /// Whether both paths resolve to the same file on disk.
    async fn same_file(source: &Path, destination: &Path) -> Result<bool, PlacerError> {
        let source = fs::canonicalize(source)
            .await
            .map_err(|e| PlacerError::io(source, e))?;
        let destination = fs::canonicalize(destination)
            .await
            .map_err(|e| PlacerError::io(destination, e))?;
        Ok(source == destination)
    }

    /// Places `source` into `dest_dir` under its own file name.
    pub async fn place(
        &self,
        source: &Path,
        dest_dir: &Path,
    ) -> Result<PlacementOutcome, PlacerError> {
        let name = source.file_name().ok_or_else(|| PlacerError::NoFileName {
            path: source.to_path_buf(),
        })?;

        let source_meta = match fs::metadata(source).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PlacerError::SourceNotFound {
                    path: source.to_path_buf(),
                })
            }
            Err(e) => return Err(PlacerError::io(source, e)),
        };

        fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| PlacerError::DirectoryCreationFailed {
                path: dest_dir.to_path_buf(),
                source: e,
            })?;

        let destination = dest_dir.join(name);
        let dest_meta = match fs::metadata(&destination).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Self::move_file(source, &destination).await?;
                debug!(source = %source.display(), destination = %destination.display(), "Moved file");
                return Ok(PlacementOutcome::Moved { path: destination });
            }
            Err(e) => return Err(PlacerError::io(&destination, e)),
        };

        if Self::same_file(source, &destination).await? {
            debug!(path = %destination.display(), "Source already at destination");
            return Ok(PlacementOutcome::Identical { path: destination });
        }

        let source_hash = self.hasher.hash_file(source).await?;
        let dest_hash = self.hasher.hash_file(&destination).await?;

        if source_hash == dest_hash {
            fs::remove_file(source)
                .await
                .map_err(|e| PlacerError::io(source, e))?;
            info!(
                source = %source.display(),
                destination = %destination.display(),
                "Destination already holds identical content, removed source"
            );
            return Ok(PlacementOutcome::Identical { path: destination });
        }

        let source_mtime = source_meta
            .modified()
            .map_err(|e| PlacerError::io(source, e))?;
        let dest_mtime = dest_meta
            .modified()
            .map_err(|e| PlacerError::io(&destination, e))?;

        if source_mtime > dest_mtime {
            Self::move_file(source, &destination).await?;
            info!(
                source = %source.display(),
                destination = %destination.display(),
                "Replaced older destination with newer source"
            );
            return Ok(PlacementOutcome::Replaced { path: destination });
        }

        let quarantined = match &self.conflict_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .await
                    .map_err(|e| PlacerError::DirectoryCreationFailed {
                        path: dir.clone(),
                        source: e,
                    })?;
                let target = dir.join(format!(
                    "{}.{}",
                    name.to_string_lossy(),
                    &source_hash.hex()[..16]
                ));
                Self::move_file(source, &target).await?;
                Some(target)
            }
            None => None,
        };

        warn!(
            source = %source.display(),
            destination = %destination.display(),
            source_hash = %source_hash,
            destination_hash = %dest_hash,
            quarantined = ?quarantined,
            "Name collision with different content and source is not newer, kept existing destination"
        );

        Ok(PlacementOutcome::KeptExisting {
            path: destination,
            quarantined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn set_mtime(path: &Path, time: SystemTime) {
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    struct Fixture {
        _dir: TempDir,
        source: PathBuf,
        dest_dir: PathBuf,
    }

    fn fixture(source_content: &[u8], dest_content: Option<&[u8]>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let src_dir = dir.path().join("in");
        let dest_dir = dir.path().join("raw");
        std::fs::create_dir_all(&src_dir).unwrap();
        std::fs::create_dir_all(&dest_dir).unwrap();

        let source = src_dir.join("run0001.dat");
        std::fs::write(&source, source_content).unwrap();
        if let Some(content) = dest_content {
            std::fs::write(dest_dir.join("run0001.dat"), content).unwrap();
        }

        Fixture {
            _dir: dir,
            source,
            dest_dir,
        }
    }

    #[tokio::test]
    async fn test_move_without_collision() {
        let fx = fixture(b"data", None);
        let placer = FsPlacer::new(FileHasher::default(), None);

        let outcome = placer.place(&fx.source, &fx.dest_dir).await.unwrap();

        assert!(matches!(outcome, PlacementOutcome::Moved { .. }));
        assert!(!fx.source.exists());
        assert_eq!(std::fs::read(outcome.path()).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_identical_content_deletes_source_regardless_of_mtime() {
        for source_newer in [true, false] {
            let fx = fixture(b"same", Some(b"same"));
            let dest = fx.dest_dir.join("run0001.dat");
            let base = SystemTime::now() - Duration::from_secs(3600);
            if source_newer {
                set_mtime(&dest, base);
            } else {
                set_mtime(&fx.source, base);
            }
            let dest_mtime_before = std::fs::metadata(&dest).unwrap().modified().unwrap();

            let placer = FsPlacer::new(FileHasher::default(), None);
            let outcome = placer.place(&fx.source, &fx.dest_dir).await.unwrap();

            assert_eq!(outcome, PlacementOutcome::Identical { path: dest.clone() });
            assert!(!fx.source.exists());
            assert_eq!(std::fs::read(&dest).unwrap(), b"same");
            assert_eq!(
                std::fs::metadata(&dest).unwrap().modified().unwrap(),
                dest_mtime_before
            );
        }
    }

    #[tokio::test]
    async fn test_newer_source_replaces_destination() {
        let fx = fixture(b"new content", Some(b"old content"));
        let dest = fx.dest_dir.join("run0001.dat");
        set_mtime(&dest, SystemTime::now() - Duration::from_secs(3600));

        let placer = FsPlacer::new(FileHasher::default(), None);
        let outcome = placer.place(&fx.source, &fx.dest_dir).await.unwrap();

        assert_eq!(outcome, PlacementOutcome::Replaced { path: dest.clone() });
        assert_eq!(std::fs::read(&dest).unwrap(), b"new content");
        assert!(!fx.source.exists());
    }

    #[tokio::test]
    async fn test_older_source_keeps_destination_and_source() {
        let fx = fixture(b"stale content", Some(b"current content"));
        set_mtime(&fx.source, SystemTime::now() - Duration::from_secs(3600));

        let placer = FsPlacer::new(FileHasher::default(), None);
        let outcome = placer.place(&fx.source, &fx.dest_dir).await.unwrap();

        assert!(matches!(
            outcome,
            PlacementOutcome::KeptExisting {
                quarantined: None,
                ..
            }
        ));
        assert_eq!(std::fs::read(outcome.path()).unwrap(), b"current content");
        assert!(fx.source.exists());
    }

    #[tokio::test]
    async fn test_older_source_quarantined_when_configured() {
        let fx = fixture(b"stale content", Some(b"current content"));
        set_mtime(&fx.source, SystemTime::now() - Duration::from_secs(3600));
        let conflict_dir = fx.dest_dir.parent().unwrap().join("conflicts");

        let placer = FsPlacer::new(FileHasher::default(), Some(conflict_dir.clone()));
        let outcome = placer.place(&fx.source, &fx.dest_dir).await.unwrap();

        let quarantined = match outcome {
            PlacementOutcome::KeptExisting {
                quarantined: Some(q),
                ..
            } => q,
            other => panic!("expected quarantined outcome, got {:?}", other),
        };
        assert!(quarantined.starts_with(&conflict_dir));
        assert_eq!(std::fs::read(&quarantined).unwrap(), b"stale content");
        assert!(!fx.source.exists());
    }

    #[tokio::test]
    async fn test_source_already_in_destination_is_kept() {
        let fx = fixture(b"data", None);
        let in_place = fx.dest_dir.join("run0001.dat");
        std::fs::write(&in_place, b"in place").unwrap();

        let placer = FsPlacer::new(FileHasher::default(), None);
        let outcome = placer.place(&in_place, &fx.dest_dir).await.unwrap();

        assert_eq!(outcome, PlacementOutcome::Identical { path: in_place.clone() });
        assert_eq!(std::fs::read(&in_place).unwrap(), b"in place");
    }

    #[tokio::test]
    async fn test_source_reached_through_other_path_is_kept() {
        let fx = fixture(b"data", None);
        let in_place = fx.dest_dir.join("run0001.dat");
        std::fs::write(&in_place, b"in place").unwrap();
        let roundabout = fx.dest_dir.join("..").join("raw").join("run0001.dat");

        let placer = FsPlacer::new(FileHasher::default(), None);
        let outcome = placer.place(&roundabout, &fx.dest_dir).await.unwrap();

        assert!(matches!(outcome, PlacementOutcome::Identical { .. }));
        assert_eq!(std::fs::read(&in_place).unwrap(), b"in place");
    }

    #[tokio::test]
    async fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let placer = FsPlacer::new(FileHasher::default(), None);
        let result = placer
            .place(&dir.path().join("missing.dat"), dir.path())
            .await;
        assert!(matches!(result, Err(PlacerError::SourceNotFound { .. })));
    }
}

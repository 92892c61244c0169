//! Directory-backed partition.
//!
//! Each entry is one file named after the BLAKE3 hash of its key. The key
//! itself is written on the first line of the file so that listing can
//! recover it (keys never contain line breaks, see [`validate_key`]).
//! Writes go to a temporary sibling first and are renamed into place.
//!
//! [`validate_key`]: crate::validate_key

use super::{KeyStream, Partition};
use crate::error::{ErrorKind, Result};
use crate::key::validate as validate_key;
use async_stream::stream;
use async_trait::async_trait;
use std::fs::create_dir_all as sync_create_dir;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

const TEMP_EXTENSION: &str = "tmp";

/// Partition stored as a directory on the local filesystem.
///
/// # Examples
///
/// ```no_run
/// use resync_storage::store::DirPartition;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let files = DirPartition::new("quiche_files", "/var/cache/app/quiche_files")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DirPartition {
    name: String,
    root: PathBuf,
}
impl DirPartition {
    /// Open (creating if needed) a partition rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not absolute, exists but is not a
    /// directory, or cannot be created.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::BackendError(format!("partition root `{}` is not absolute", root.display())));
        }
        if root.exists() {
            if !root.is_dir() {
                exn::bail!(ErrorKind::BackendError(format!("partition root `{}` is not a directory", root.display())));
            }
        } else {
            // Use non-async here; it'll only happen once when the backend is
            // opened and it's not worth making the constructor async.
            sync_create_dir(&root).map_err(ErrorKind::Io)?;
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let key = validate_key(key)?;
        Ok(self.root.join(blake3::hash(key.as_bytes()).to_string()))
    }

    /// Split a stored entry into its key line and data, checking the key is
    /// the one that was asked for.
    fn split_entry(key: &str, mut raw: Vec<u8>) -> Option<Vec<u8>> {
        let newline = raw.iter().position(|b| *b == b'\n')?;
        if &raw[..newline] != key.as_bytes() {
            return None;
        }
        Some(raw.split_off(newline + 1))
    }

    async fn read_key(path: &Path) -> Result<Option<String>> {
        let file = match fs::File::open(path).await {
            Ok(file) => file,
            // Removed between listing and reading.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ErrorKind::Io(e).into()),
        };
        let mut line = String::new();
        BufReader::new(file).read_line(&mut line).await.map_err(ErrorKind::Io)?;
        match line.strip_suffix('\n') {
            Some(key) if !key.is_empty() => Ok(Some(key.to_string())),
            _ => {
                tracing::warn!(path = %path.display(), "Ignoring partition entry without a key line");
                Ok(None)
            },
        }
    }
}

#[async_trait]
impl Partition for DirPartition {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.entry_path(key)?;
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ErrorKind::Io(e).into()),
        };
        let data = Self::split_entry(key, raw);
        if data.is_none() {
            tracing::warn!(partition = %self.name, key, "Entry on disk belongs to a different key");
        }
        Ok(data)
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        Ok(fs::try_exists(&path).await.map_err(ErrorKind::Io)?)
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.entry_path(key)?;
        let temp = path.with_extension(TEMP_EXTENSION);
        let mut raw = Vec::with_capacity(key.len() + 1 + data.len());
        raw.extend_from_slice(key.as_bytes());
        raw.push(b'\n');
        raw.extend_from_slice(data);
        // The directory may have been reset underneath us.
        fs::create_dir_all(&self.root).await.map_err(ErrorKind::Io)?;
        fs::write(&temp, &raw).await.map_err(ErrorKind::Io)?;
        Ok(fs::rename(&temp, &path).await.map_err(ErrorKind::Io)?)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ErrorKind::Io(e).into()),
        }
    }

    fn keys_stream<'a>(&'a self) -> KeyStream<'a> {
        Box::pin(stream! {
            let mut entries = match fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                // A partition that was never written to lists as empty.
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
                Err(err) => {
                    yield Err(exn::Exn::from(ErrorKind::Io(err)));
                    return;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => { yield Err(exn::Exn::from(ErrorKind::Io(e))); continue; },
                };
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == TEMP_EXTENSION) {
                    continue;
                }
                match Self::read_key(&path).await {
                    Ok(Some(key)) => yield Ok(key),
                    Ok(None) => {},
                    Err(e) => yield Err(e),
                }
            }
        })
    }

    async fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(ErrorKind::Io(e).into()),
        }
        Ok(fs::create_dir_all(&self.root).await.map_err(ErrorKind::Io)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(temp_dir: &tempfile::TempDir) -> DirPartition {
        DirPartition::new("test_files", temp_dir.path().join("test_files")).unwrap()
    }

    #[test]
    fn test_new_requires_absolute_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(DirPartition::new("name", temp_dir.path()).is_ok());
        assert!(DirPartition::new("name", "relative/path").is_err());
    }

    #[test]
    fn test_new_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(DirPartition::new("name", &file).is_err());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = tempfile::tempdir().unwrap();
        let partition = partition(&temp_dir);
        partition.put("https://x.io/a.js", b"console.log(1)").await.unwrap();
        assert_eq!(partition.get("https://x.io/a.js").await.unwrap().unwrap(), b"console.log(1)");
        assert!(partition.contains("https://x.io/a.js").await.unwrap());
        assert!(partition.get("https://x.io/b.js").await.unwrap().is_none());
        assert!(!partition.contains("https://x.io/b.js").await.unwrap());
    }

    #[tokio::test]
    async fn test_binary_data_with_newlines() {
        let temp_dir = tempfile::tempdir().unwrap();
        let partition = partition(&temp_dir);
        let data = [0u8, b'\n', 255, b'\n', b'\n'];
        partition.put("font.woff2", &data).await.unwrap();
        assert_eq!(partition.get("font.woff2").await.unwrap().unwrap(), data);
    }

    #[tokio::test]
    async fn test_put_overwrites_and_leaves_no_temp_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let partition = partition(&temp_dir);
        partition.put("a", b"one").await.unwrap();
        partition.put("a", b"two").await.unwrap();
        assert_eq!(partition.get("a").await.unwrap().unwrap(), b"two");
        let files: Vec<_> = std::fs::read_dir(partition.root()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_keys() {
        let temp_dir = tempfile::tempdir().unwrap();
        let partition = partition(&temp_dir);
        partition.put("a.js", b"1").await.unwrap();
        partition.put("https://x.io/b.css", b"2").await.unwrap();
        let mut keys = partition.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a.js".to_string(), "https://x.io/b.css".to_string()]);
    }

    #[tokio::test]
    async fn test_remove() {
        let temp_dir = tempfile::tempdir().unwrap();
        let partition = partition(&temp_dir);
        partition.put("a", b"1").await.unwrap();
        partition.remove("a").await.unwrap();
        assert!(partition.get("a").await.unwrap().is_none());
        // Removing again is fine
        partition.remove("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_reopens_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let partition = partition(&temp_dir);
        partition.put("a", b"1").await.unwrap();
        partition.reset().await.unwrap();
        assert!(partition.keys().await.unwrap().is_empty());
        partition.put("b", b"2").await.unwrap();
        assert_eq!(partition.get("b").await.unwrap().unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_mismatched_key_reads_as_absent() {
        let temp_dir = tempfile::tempdir().unwrap();
        let partition = partition(&temp_dir);
        partition.put("a", b"1").await.unwrap();
        // Simulate a hash collision: the file for "a" claims to hold "b".
        let path = partition.entry_path("a").unwrap();
        std::fs::write(&path, b"b\n1").unwrap();
        assert!(partition.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let partition = partition(&temp_dir);
        assert!(partition.put("", b"x").await.is_err());
        assert!(partition.put("a\nb", b"x").await.is_err());
        assert!(partition.get("a\0b").await.is_err());
    }
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::cache::{Body, Cache, CacheKey, CacheRecord, Relations};
use crate::config::ConfigProperties;
use crate::error::{io_failure, CacheError};
use crate::{log_debug, log_error, Result};

const KEY_FILENAME: &str = "key";
const RESPONSE_FILENAME: &str = "response";
const BODY_FILENAME: &str = "body";
const RELS_FILENAME: &str = "rels";
const TEMP_PREFIX: &str = "tmp_";

/// Stores every key in its own directory, `<root>/aa/bb/<sha256>/`, holding
/// up to four files: `key`, `response`, `body` and `rels`. Files are replaced
/// through a temporary sibling and a rename, so a reader sees either the old
/// or the new file, never a partial one.
pub struct FileCache {
    root: PathBuf,
    // Writers are exclusive within the process. Readers take the shared side
    // so metadata and body come from the same write.
    lock: RwLock<()>,
}

impl FileCache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        FileCache {
            root: root.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn from_config(config: &impl ConfigProperties) -> Result<Self> {
        let cache_location = config.cache_location().ok_or_else(|| {
            CacheError::ConfigurationError("No cache_location has been configured".to_string())
        })?;
        let cache = FileCache::new(cache_location);
        cache.validate_cache_location()?;
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn validate_cache_location(&self) -> Result<()> {
        let path = self.root.as_path();
        let cache_location = path.display();

        if !path.exists() {
            return Err(CacheError::CacheLocationDoesNotExist(format!(
                "Cache directory does not exist: {cache_location}"
            ))
            .into());
        }

        if !path.is_dir() {
            return Err(CacheError::CacheLocationIsNotADirectory(format!(
                "Cache location is not a directory: {cache_location}"
            ))
            .into());
        }

        // Check if we can write to the directory
        let test_file_path = path.join(".write_test_cache_file");
        match File::create(&test_file_path) {
            Ok(_) => {
                if let Err(e) = fs::remove_file(&test_file_path) {
                    return Err(CacheError::CacheLocationWriteTestFailed(format!(
                        "Failed to remove cache test file {}: {}",
                        test_file_path.display(),
                        e
                    ))
                    .into());
                }
            }
            Err(e) => {
                return Err(CacheError::CacheLocationIsNotWriteable(format!(
                    "No write permission for cache directory {cache_location}: {e}"
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Directory holding the files of `key`.
    pub fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.shard_path())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_metadata(&self, dir: &Path) -> Result<Option<CacheRecord>> {
        let path = dir.join(RESPONSE_FILENAME);
        let f = match File::open(&path) {
            Ok(f) => f,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_failure(&path, err)),
        };
        let record = decode_metadata(BufReader::new(f)).map_err(|err| {
            CacheError::CorruptRecord(format!("{}: {}", path.display(), err))
        })?;
        Ok(Some(record))
    }
}

fn decode_metadata(reader: impl BufRead) -> Result<CacheRecord> {
    let decoder = GzDecoder::new(reader);
    let record = serde_json::from_reader(decoder)?;
    Ok(record)
}

fn encode_metadata(record: &CacheRecord, writer: impl Write) -> Result<()> {
    let mut encoder = GzEncoder::new(writer, Compression::default());
    serde_json::to_writer(&mut encoder, record)?;
    encoder.finish()?;
    Ok(())
}

fn read_body(dir: &Path) -> Result<Body> {
    let path = dir.join(BODY_FILENAME);
    match fs::read(&path) {
        Ok(bytes) => Ok(Body::Bytes(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Body::Missing(path)),
        Err(err) => Err(io_failure(&path, err)),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_failure(path, err)),
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|err| io_failure(dir, err))
}

/// A temporary sibling of `path`, fully written and synced, waiting to be
/// renamed over it.
struct Staged {
    temp: PathBuf,
    path: PathBuf,
}

impl Staged {
    fn commit(self) -> Result<()> {
        let result =
            fs::rename(&self.temp, &self.path).map_err(|err| io_failure(&self.path, err));
        if result.is_err() {
            self.discard();
        }
        result
    }

    fn discard(&self) {
        let _ = fs::remove_file(&self.temp);
    }
}

/// Write `dir/tmp_name` and sync it. Nothing is visible under `dir/name`
/// until the returned file is committed. On failure the temporary file is
/// removed.
fn stage<F>(dir: &Path, name: &str, write: F) -> Result<Staged>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let staged = Staged {
        temp: dir.join(format!("{TEMP_PREFIX}{name}")),
        path: dir.join(name),
    };
    let temp = &staged.temp;
    let result = (|| -> Result<()> {
        let f = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(temp)
            .map_err(|err| io_failure(temp, err))?;
        let mut writer = BufWriter::new(f);
        write(&mut writer)?;
        let f = writer
            .into_inner()
            .map_err(|err| io_failure(temp, err.into_error()))?;
        f.sync_all().map_err(|err| io_failure(temp, err))
    })();
    match result {
        Ok(()) => Ok(staged),
        Err(err) => {
            staged.discard();
            Err(err)
        }
    }
}

/// Replace `dir/name` through `dir/tmp_name`. The target is left as it was
/// unless the whole write succeeds.
fn write_atomic<F>(dir: &Path, name: &str, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    stage(dir, name, write)?.commit()
}

/// Stage every file of a record. Either all of them are staged or none is
/// left behind.
fn stage_record(dir: &Path, key: &CacheKey, record: &CacheRecord) -> Result<Vec<Staged>> {
    let mut staged = Vec::new();
    let result = (|| -> Result<()> {
        staged.push(stage(dir, KEY_FILENAME, |w| {
            w.write_all(key.as_str().as_bytes())?;
            Ok(())
        })?);
        if let Body::Bytes(bytes) = &record.body {
            staged.push(stage(dir, BODY_FILENAME, |w| {
                w.write_all(bytes)?;
                Ok(())
            })?);
        }
        // response goes last, committing it is what publishes the record
        staged.push(stage(dir, RESPONSE_FILENAME, |w| encode_metadata(record, w))?);
        Ok(())
    })();
    match result {
        Ok(()) => Ok(staged),
        Err(err) => {
            staged.iter().for_each(Staged::discard);
            Err(err)
        }
    }
}

impl Cache for FileCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        let dir = self.record_path(key);
        let _guard = self.read_guard();
        match self.read_metadata(&dir)? {
            Some(mut record) => {
                record.body = read_body(&dir)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &CacheKey, record: &CacheRecord) -> Result<()> {
        let dir = self.record_path(key);
        let _guard = self.write_guard();
        create_dir(&dir)?;
        let mut staged = stage_record(&dir, key, record)?.into_iter();
        // Without a response file the entry is a miss. Dropping it before
        // swapping the body means an interrupted commit never pairs a body
        // with metadata from another write.
        let result = (|| -> Result<()> {
            remove_if_exists(&dir.join(RESPONSE_FILENAME))?;
            if let Body::Missing(_) = record.body {
                remove_if_exists(&dir.join(BODY_FILENAME))?;
            }
            for file in staged.by_ref() {
                file.commit()?;
            }
            Ok(())
        })();
        if result.is_err() {
            staged.for_each(|file| file.discard());
        }
        result?;
        log_debug!("Cached response for {} in {}", key, dir.display());
        Ok(())
    }

    fn reset(&self, key: &CacheKey) -> Result<()> {
        let dir = self.record_path(key);
        let _guard = self.write_guard();
        // response first: without it the entry is gone for readers
        remove_if_exists(&dir.join(RESPONSE_FILENAME))?;
        remove_if_exists(&dir.join(BODY_FILENAME))?;
        remove_if_exists(&dir.join(KEY_FILENAME))
    }

    fn update_expiration(&self, key: &CacheKey, expires_at: DateTime<Utc>) -> Result<()> {
        let dir = self.record_path(key);
        let _guard = self.write_guard();
        let mut record = self
            .read_metadata(&dir)?
            .ok_or_else(|| CacheError::NotFound(key.to_string()))?;
        record.expires_at = expires_at;
        write_atomic(&dir, RESPONSE_FILENAME, |w| encode_metadata(&record, w))
    }

    fn set_relations(&self, key: &CacheKey, relations: &Relations) -> Result<()> {
        let dir = self.record_path(key);
        let _guard = self.write_guard();
        if relations.is_empty() {
            return remove_if_exists(&dir.join(RELS_FILENAME));
        }
        create_dir(&dir)?;
        write_atomic(&dir, RELS_FILENAME, |w| {
            serde_json::to_writer(w, relations)?;
            Ok(())
        })
    }

    fn get_relations(&self, key: &CacheKey) -> Result<Option<Relations>> {
        let path = self.record_path(key).join(RELS_FILENAME);
        let _guard = self.read_guard();
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_failure(&path, err)),
        };
        match serde_json::from_slice::<Relations>(&data) {
            Ok(relations) => Ok(Some(relations)),
            Err(err) => {
                log_error!("Ignoring corrupt relations in {}: {}", path.display(), err);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Headers;
    use chrono::{TimeDelta, TimeZone};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn key() -> CacheKey {
        CacheKey::compute("application/json", "https://api.example.com/users/1")
    }

    fn record(body: &str) -> CacheRecord {
        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json");
        headers.set("Cache-Control", "max-age=60");
        headers.append("Link", "<https://api.example.com/users/2>; rel=\"next\"");
        CacheRecord::builder()
            .status("200 OK")
            .headers(headers)
            .content_length(body.len() as u64)
            .expires_at(t0() + TimeDelta::seconds(60))
            .body(Body::Bytes(body.as_bytes().to_vec()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_record_path_is_sharded() {
        let cache = FileCache::new("/home/user/.cache");
        let digest = key().digest();
        assert_eq!(
            PathBuf::from(format!(
                "/home/user/.cache/{}/{}/{}",
                &digest[0..2],
                &digest[2..4],
                digest
            )),
            cache.record_path(&key())
        );
    }

    #[test]
    fn test_set_writes_key_response_and_body_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path());
        cache.set(&key(), &record("{\"id\":1}")).unwrap();
        let dir = cache.record_path(&key());
        assert_eq!(
            key().as_str(),
            fs::read_to_string(dir.join(KEY_FILENAME)).unwrap()
        );
        assert_eq!(b"{\"id\":1}".to_vec(), fs::read(dir.join(BODY_FILENAME)).unwrap());
        assert!(dir.join(RESPONSE_FILENAME).exists());
        assert!(!dir.join(RELS_FILENAME).exists());
        // no temporary leftovers
        for entry in fs::read_dir(&dir).unwrap() {
            let name = entry.unwrap().file_name();
            assert!(!name.to_string_lossy().starts_with(TEMP_PREFIX));
        }
    }

    #[test]
    fn test_metadata_round_trip_through_gzip() {
        let mut buf = Vec::new();
        encode_metadata(&record("ignored"), &mut buf).unwrap();
        let decoded = decode_metadata(std::io::Cursor::new(buf)).unwrap();
        let expected = CacheRecord {
            body: Body::default(),
            ..record("ignored")
        };
        assert_eq!(expected, decoded);
    }

    #[test]
    fn test_write_atomic_failure_keeps_previous_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        write_atomic(dir, RESPONSE_FILENAME, |w| {
            w.write_all(b"committed")?;
            Ok(())
        })
        .unwrap();

        let result = write_atomic(dir, RESPONSE_FILENAME, |w| {
            w.write_all(b"half writ")?;
            Err(CacheError::IoFailure("disk full".to_string()).into())
        });

        assert!(result.is_err());
        assert_eq!(
            "committed",
            fs::read_to_string(dir.join(RESPONSE_FILENAME)).unwrap()
        );
        assert!(!dir.join(format!("{TEMP_PREFIX}{RESPONSE_FILENAME}")).exists());
    }

    #[test]
    fn test_failed_staging_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        // a directory in the way makes the response temp file unopenable
        fs::create_dir(dir.join(format!("{TEMP_PREFIX}{RESPONSE_FILENAME}"))).unwrap();

        let result = stage_record(dir, &key(), &record("new body"));

        assert!(result.is_err());
        assert!(!dir.join(format!("{TEMP_PREFIX}{KEY_FILENAME}")).exists());
        assert!(!dir.join(format!("{TEMP_PREFIX}{BODY_FILENAME}")).exists());
        assert!(!dir.join(KEY_FILENAME).exists());
        assert!(!dir.join(BODY_FILENAME).exists());
    }

    #[test]
    fn test_corrupt_response_is_corrupt_record() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path());
        cache.set(&key(), &record("body")).unwrap();
        let dir = cache.record_path(&key());
        fs::write(dir.join(RESPONSE_FILENAME), b"not gzip at all").unwrap();

        let err = cache.get(&key()).unwrap_err();
        match err.downcast_ref::<CacheError>() {
            Some(CacheError::CorruptRecord(_)) => (),
            _ => panic!("Expected CorruptRecord"),
        }

        // next successful set overwrites the corrupt entry
        cache.set(&key(), &record("fixed")).unwrap();
        let cached = cache.get(&key()).unwrap().unwrap();
        assert_eq!(b"fixed", cached.body().unwrap());
    }

    #[test]
    fn test_missing_body_fails_lazily() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path());
        cache.set(&key(), &record("body")).unwrap();
        fs::remove_file(cache.record_path(&key()).join(BODY_FILENAME)).unwrap();

        let cached = cache.get(&key()).unwrap().unwrap();
        assert_eq!(200, cached.status_code);
        assert!(cached.body().is_err());
    }

    #[test]
    fn test_set_with_missing_body_removes_body_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path());
        cache.set(&key(), &record("body")).unwrap();
        let without_body = CacheRecord {
            body: Body::Missing(PathBuf::from("elsewhere")),
            ..record("body")
        };
        cache.set(&key(), &without_body).unwrap();
        assert!(!cache.record_path(&key()).join(BODY_FILENAME).exists());
    }

    #[test]
    fn test_corrupt_relations_are_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path());
        let dir = cache.record_path(&key());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RELS_FILENAME), b"{not json").unwrap();
        assert!(cache.get_relations(&key()).unwrap().is_none());
    }

    #[test]
    fn test_empty_relations_remove_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::new(temp_dir.path());
        let mut relations = Relations::new();
        relations.insert("self".to_string(), "https://api.example.com/users/1".to_string());
        cache.set_relations(&key(), &relations).unwrap();
        let rels_file = cache.record_path(&key()).join(RELS_FILENAME);
        assert!(rels_file.exists());
        cache.set_relations(&key(), &Relations::new()).unwrap();
        assert!(!rels_file.exists());
        // removing what is not there is fine
        cache.set_relations(&key(), &Relations::new()).unwrap();
    }
}

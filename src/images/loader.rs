//! Payload loading from assets, local files and the network.
//!
//! Every read happens in fixed-size chunks so a cancelled task stops at the
//! next chunk boundary instead of finishing the transfer.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, Result};
use crate::key;
use crate::models::{ASSET_SCHEME, MediaOrigin, RequestIdentity};

const CHUNK_SIZE: usize = 16 * 1024;

/// Something that can retrieve the bytes behind a URL.
pub trait Fetcher: Send + Sync {
    /// Download `url`, checking `cancel` between chunks.
    fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>>;
}

/// Blocking HTTP fetcher backed by a `ureq` agent.
pub struct HttpFetcher {
    agent: ureq::Agent,
    max_payload_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher with the given transport timeout and payload limit.
    pub fn new(timeout: Duration, user_agent: &str, max_payload_bytes: usize) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(user_agent)
            .build();
        Self {
            agent,
            max_payload_bytes,
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
        tracing::debug!("Downloading image: {url}");

        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(PipelineError::Status {
                    url: url.to_string(),
                    status,
                });
            }
            Err(ureq::Error::Transport(transport)) => {
                return Err(PipelineError::Transport {
                    url: url.to_string(),
                    message: transport.to_string(),
                });
            }
        };

        let mut reader = response.into_reader();
        read_cancellable(&mut reader, cancel, self.max_payload_bytes).map_err(|e| match e {
            PipelineError::Io { source, .. } => PipelineError::Transport {
                url: url.to_string(),
                message: source.to_string(),
            },
            other => other,
        })
    }
}

/// Where a payload was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Memory cache
    Memory,
    /// Asset or local file
    File,
    /// Disk cache entry of a network source
    DiskCache,
    /// Freshly downloaded, not yet on disk
    Network,
}

/// A loaded payload and where it came from.
#[derive(Debug)]
pub struct Loaded {
    /// Raw encoded bytes
    pub bytes: Vec<u8>,
    /// Origin of the bytes
    pub provenance: Provenance,
}

impl Loaded {
    const fn new(bytes: Vec<u8>, provenance: Provenance) -> Self {
        Self { bytes, provenance }
    }
}

/// Resolves a request identity to its raw payload.
pub struct PayloadLoader {
    asset_root: PathBuf,
    disk_cache_dir: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    max_payload_bytes: usize,
}

impl PayloadLoader {
    /// Create a loader.
    pub fn new(
        asset_root: PathBuf,
        disk_cache_dir: PathBuf,
        fetcher: Arc<dyn Fetcher>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            asset_root,
            disk_cache_dir,
            fetcher,
            max_payload_bytes,
        }
    }

    /// Disk cache file for a location.
    pub fn cache_path_for(&self, location: &str) -> PathBuf {
        key::cache_path(&self.disk_cache_dir, location)
    }

    /// Directory holding persisted network payloads.
    pub fn disk_cache_dir(&self) -> &Path {
        &self.disk_cache_dir
    }

    /// Load the payload for `identity`.
    ///
    /// Network payloads are not written to disk here; the caller persists
    /// them with [`PayloadLoader::persist`] once they are known to decode.
    pub fn load(&self, identity: &RequestIdentity, cancel: &CancellationToken) -> Result<Loaded> {
        let location = identity.source.location.as_str();
        match identity.source.origin {
            MediaOrigin::Asset => Ok(Loaded::new(
                self.read_file(&self.asset_path(location), cancel)?,
                Provenance::File,
            )),
            MediaOrigin::LocalFile => Ok(Loaded::new(
                self.read_file(Path::new(location), cancel)?,
                Provenance::File,
            )),
            MediaOrigin::Network => self.load_network(location, identity.cache_enabled, cancel),
        }
    }

    /// Write a network payload to the disk cache.
    pub fn persist(&self, location: &str, bytes: &[u8]) -> io::Result<()> {
        write_atomically(&self.cache_path_for(location), bytes)
    }

    /// Remove the disk cache entry for `location`, if any.
    pub fn evict(&self, location: &str) -> io::Result<()> {
        match fs::remove_file(self.cache_path_for(location)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    fn asset_path(&self, name: &str) -> PathBuf {
        let relative = name.strip_prefix(ASSET_SCHEME).unwrap_or(name);
        self.asset_root.join(relative.trim_start_matches('/'))
    }

    fn read_file(&self, path: &Path, cancel: &CancellationToken) -> Result<Vec<u8>> {
        let mut file = fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
        read_cancellable(&mut file, cancel, self.max_payload_bytes).map_err(|e| match e {
            PipelineError::Io { source, .. } => PipelineError::io(path, source),
            other => other,
        })
    }

    fn load_network(&self, url: &str, use_disk: bool, cancel: &CancellationToken) -> Result<Loaded> {
        let cache_path = self.cache_path_for(url);

        if use_disk && cache_path.is_file() {
            match self.read_file(&cache_path, cancel) {
                Ok(bytes) if !bytes.is_empty() => {
                    tracing::debug!(url, path = %cache_path.display(), "Disk cache hit");
                    return Ok(Loaded::new(bytes, Provenance::DiskCache));
                }
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Ok(_) => tracing::debug!(url, "Ignoring empty disk cache entry"),
                Err(e) => tracing::warn!(url, "Unreadable disk cache entry: {e}"),
            }
        }

        let bytes = self.fetcher.fetch(url, cancel)?;
        Ok(Loaded::new(bytes, Provenance::Network))
    }
}

/// Read everything from `reader`, stopping early on cancellation or when
/// more than `limit` bytes arrive.
pub fn read_cancellable<R: Read>(
    reader: &mut R,
    cancel: &CancellationToken,
    limit: usize,
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => return Ok(out),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source) => {
                return Err(PipelineError::Io {
                    path: PathBuf::new(),
                    source,
                });
            }
        };
        if out.len() + read > limit {
            return Err(PipelineError::TooLarge { limit });
        }
        out.extend_from_slice(&chunk[..read]);
    }
}

/// Write a payload next to its final location, then rename it into place so
/// readers never observe a partial file.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("part");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

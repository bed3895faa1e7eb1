//! Narrow interface to the external content-addressed store.
//!
//! Only four operations are consumed: add a file, add bytes, fetch by
//! address, and list pinned addresses. Two backends implement them:
//!
//! | Backend | Addresses | Used for |
//! |---------|-----------|----------|
//! | [`IpfsCli`] | CIDs from the `ipfs` binary | a running IPFS node |
//! | [`LocalBlobStore`] | `sha256-<hex>` | offline use and tests |

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::StoreConfig;
use crate::models::ContentAddress;

pub trait ContentStore: Send + Sync {
    /// Backend label for log lines.
    fn name(&self) -> &str;

    /// Add (and pin) a file, returning its address.
    fn add(&self, path: &Path) -> Result<ContentAddress>;

    /// Add (and pin) raw bytes, returning their address.
    fn add_bytes(&self, bytes: &[u8]) -> Result<ContentAddress>;

    /// Fetch the bytes stored under `address`.
    fn get(&self, address: &ContentAddress) -> Result<Vec<u8>>;

    /// Every pinned address, in the store's listing order.
    fn list_pinned(&self) -> Result<Vec<ContentAddress>>;
}

pub fn create_content_store(config: &StoreConfig) -> Result<Box<dyn ContentStore>> {
    match config.backend.as_str() {
        "ipfs" => Ok(Box::new(IpfsCli::new(&config.ipfs_bin))),
        "local" => Ok(Box::new(LocalBlobStore::new(&config.local_dir))),
        other => bail!("Unknown store backend: {}", other),
    }
}

// ============ IPFS CLI ============

/// Talks to the local node through the `ipfs` command-line client.
pub struct IpfsCli {
    bin: String,
}

impl IpfsCli {
    pub fn new(bin: &str) -> Self {
        Self {
            bin: bin.to_string(),
        }
    }

    fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute '{}'. Is IPFS installed?", self.bin))?;

        if let Some(bytes) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| anyhow::anyhow!("ipfs stdin unavailable"))?;
            pipe.write_all(bytes)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ipfs {} failed: {}", args.join(" "), stderr.trim());
        }
        Ok(output.stdout)
    }

    fn parse_address(stdout: &[u8]) -> Result<ContentAddress> {
        let text = String::from_utf8_lossy(stdout);
        let cid = text.lines().last().unwrap_or_default();
        Ok(ContentAddress::parse(cid)?)
    }
}

impl ContentStore for IpfsCli {
    fn name(&self) -> &str {
        "ipfs"
    }

    fn add(&self, path: &Path) -> Result<ContentAddress> {
        let path_str = path.to_string_lossy();
        let out = self.run(&["add", "-Q", "--pin=true", path_str.as_ref()], None)?;
        Self::parse_address(&out)
    }

    fn add_bytes(&self, bytes: &[u8]) -> Result<ContentAddress> {
        let out = self.run(&["add", "-Q", "--pin=true"], Some(bytes))?;
        Self::parse_address(&out)
    }

    fn get(&self, address: &ContentAddress) -> Result<Vec<u8>> {
        self.run(&["cat", address.as_str()], None)
    }

    fn list_pinned(&self) -> Result<Vec<ContentAddress>> {
        let out = self.run(&["pin", "ls", "--type=recursive", "-q"], None)?;
        parse_pin_listing(&String::from_utf8_lossy(&out))
    }
}

/// One address per line; blank lines ignored, trailing columns dropped.
fn parse_pin_listing(listing: &str) -> Result<Vec<ContentAddress>> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|cid| ContentAddress::parse(cid).map_err(Into::into))
        .collect()
}

// ============ Local blob directory ============

/// A directory of blobs named by the SHA-256 of their content. Every blob
/// present counts as pinned.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    fn address_for(bytes: &[u8]) -> Result<ContentAddress> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(ContentAddress::parse(&format!(
            "sha256-{:x}",
            hasher.finalize()
        ))?)
    }
}

impl ContentStore for LocalBlobStore {
    fn name(&self) -> &str {
        "local"
    }

    fn add(&self, path: &Path) -> Result<ContentAddress> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.add_bytes(&bytes)
    }

    fn add_bytes(&self, bytes: &[u8]) -> Result<ContentAddress> {
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create {}", self.root.display()))?;
        let address = Self::address_for(bytes)?;
        let target = self.root.join(address.as_str());
        if !target.exists() {
            let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
            tmp.write_all(bytes)?;
            tmp.persist(&target)?;
        }
        Ok(address)
    }

    fn get(&self, address: &ContentAddress) -> Result<Vec<u8>> {
        let path = self.root.join(address.as_str());
        std::fs::read(&path).with_context(|| format!("No blob stored for {}", address))
    }

    fn list_pinned(&self) -> Result<Vec<ContentAddress>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(hex) = name.strip_prefix("sha256-") {
                if hex.len() == 64 {
                    out.push(ContentAddress::parse(&name)?);
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

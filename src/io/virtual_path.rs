use crate::types::{S2Error, S2Result};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use zip::ZipArchive;

/// Root of a product tree: a plain directory or a SAFE package delivered as
/// a ZIP archive. The archive handle is shared by all paths of the product.
enum ProductRoot {
    Directory(PathBuf),
    Archive {
        path: PathBuf,
        archive: Mutex<ZipArchive<File>>,
    },
}

impl std::fmt::Debug for ProductRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductRoot::Directory(path) => write!(f, "Directory({})", path.display()),
            ProductRoot::Archive { path, .. } => write!(f, "Archive({})", path.display()),
        }
    }
}

/// Path into a product tree, uniform over directory and archive products
#[derive(Debug, Clone)]
pub struct VirtualPath {
    root: Arc<ProductRoot>,
    /// '/'-separated path relative to the root, empty for the root itself
    relative: String,
}

/// A product file resolved to the local filesystem. Archive entries without a
/// cache directory are extracted to a temporary file that lives as long as
/// this value.
#[derive(Debug)]
pub enum LocalFile {
    Path(PathBuf),
    Temp(NamedTempFile),
}

impl LocalFile {
    pub fn path(&self) -> &Path {
        match self {
            LocalFile::Path(path) => path,
            LocalFile::Temp(file) => file.path(),
        }
    }
}

impl VirtualPath {
    /// Open a product root, dispatching on the file type
    pub fn open<P: AsRef<Path>>(path: P) -> S2Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(S2Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }
        if path.is_dir() {
            Self::directory(path)
        } else {
            Self::archive(path)
        }
    }

    /// Product root backed by a plain directory
    pub fn directory<P: AsRef<Path>>(path: P) -> S2Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_dir() {
            return Err(S2Error::InvalidFormat(format!(
                "Not a directory: {}",
                path.display()
            )));
        }
        Ok(Self {
            root: Arc::new(ProductRoot::Directory(path)),
            relative: String::new(),
        })
    }

    /// Product root backed by a ZIP archive
    pub fn archive<P: AsRef<Path>>(path: P) -> S2Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let archive = ZipArchive::new(file)
            .map_err(|e| S2Error::InvalidFormat(format!("Failed to open ZIP: {}", e)))?;
        Ok(Self {
            root: Arc::new(ProductRoot::Archive {
                path,
                archive: Mutex::new(archive),
            }),
            relative: String::new(),
        })
    }

    /// Resolve a child path
    pub fn resolve(&self, child: &str) -> VirtualPath {
        let relative = if self.relative.is_empty() {
            child.to_string()
        } else {
            format!("{}/{}", self.relative, child)
        };
        VirtualPath {
            root: Arc::clone(&self.root),
            relative,
        }
    }

    /// Parent path, `None` at the root
    pub fn parent(&self) -> Option<VirtualPath> {
        if self.relative.is_empty() {
            return None;
        }
        let relative = match self.relative.rfind('/') {
            Some(pos) => self.relative[..pos].to_string(),
            None => String::new(),
        };
        Some(VirtualPath {
            root: Arc::clone(&self.root),
            relative,
        })
    }

    /// Last path segment, or the root file name
    pub fn file_name(&self) -> String {
        if let Some(pos) = self.relative.rfind('/') {
            return self.relative[pos + 1..].to_string();
        }
        if !self.relative.is_empty() {
            return self.relative.clone();
        }
        let root_path = match self.root.as_ref() {
            ProductRoot::Directory(path) => path,
            ProductRoot::Archive { path, .. } => path,
        };
        root_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Displayable full path, for log and error messages
    pub fn full_path_string(&self) -> String {
        let root_path = match self.root.as_ref() {
            ProductRoot::Directory(path) => path.display().to_string(),
            ProductRoot::Archive { path, .. } => path.display().to_string(),
        };
        if self.relative.is_empty() {
            root_path
        } else {
            format!("{}/{}", root_path, self.relative)
        }
    }

    pub fn exists(&self) -> bool {
        match self.root.as_ref() {
            ProductRoot::Directory(path) => path.join(&self.relative).exists(),
            ProductRoot::Archive { archive, .. } => {
                if self.relative.is_empty() {
                    return true;
                }
                let archive = archive.lock().unwrap();
                let dir_prefix = format!("{}/", self.relative);
                let found = archive
                    .file_names()
                    .any(|name| name == self.relative || name.starts_with(&dir_prefix));
                found
            }
        }
    }

    /// Names of the immediate children, sorted for a stable listing order
    pub fn list(&self) -> S2Result<Vec<String>> {
        let mut names = match self.root.as_ref() {
            ProductRoot::Directory(path) => {
                let dir = path.join(&self.relative);
                let mut names = Vec::new();
                for entry in fs::read_dir(&dir)? {
                    let entry = entry?;
                    names.push(entry.file_name().to_string_lossy().to_string());
                }
                names
            }
            ProductRoot::Archive { archive, .. } => {
                let archive = archive.lock().unwrap();
                let prefix = if self.relative.is_empty() {
                    String::new()
                } else {
                    format!("{}/", self.relative)
                };
                let mut names = Vec::new();
                for name in archive.file_names() {
                    if let Some(rest) = name.strip_prefix(&prefix) {
                        if rest.is_empty() {
                            continue;
                        }
                        let segment = match rest.find('/') {
                            Some(pos) => &rest[..pos],
                            None => rest,
                        };
                        if !segment.is_empty() && !names.iter().any(|n| n == segment) {
                            names.push(segment.to_string());
                        }
                    }
                }
                names
            }
        };
        names.sort();
        Ok(names)
    }

    /// Read the whole file into memory
    pub fn read_bytes(&self) -> S2Result<Vec<u8>> {
        match self.root.as_ref() {
            ProductRoot::Directory(path) => Ok(fs::read(path.join(&self.relative))?),
            ProductRoot::Archive { archive, .. } => {
                let mut archive = archive.lock().unwrap();
                let mut entry = archive.by_name(&self.relative).map_err(|e| {
                    S2Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Failed to read {}: {}", self.relative, e),
                    ))
                })?;
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                Ok(bytes)
            }
        }
    }

    /// Resolve this path to a local file the codec can open directly.
    ///
    /// Directory products return the file path untouched. Archive entries are
    /// extracted into `cache_dir` once and reused on later calls; without a
    /// cache directory a temporary file is used instead.
    pub fn local_file(&self, cache_dir: Option<&Path>) -> S2Result<LocalFile> {
        match self.root.as_ref() {
            ProductRoot::Directory(path) => Ok(LocalFile::Path(path.join(&self.relative))),
            ProductRoot::Archive { archive, .. } => {
                if let Some(cache_dir) = cache_dir {
                    let target = cache_dir.join(&self.relative);
                    if target.exists() {
                        return Ok(LocalFile::Path(target));
                    }
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let bytes = self.read_bytes()?;
                    fs::write(&target, bytes)?;
                    log::debug!("Extracted {} to cache", self.relative);
                    return Ok(LocalFile::Path(target));
                }
                let mut archive = archive.lock().unwrap();
                let mut entry = archive.by_name(&self.relative).map_err(|e| {
                    S2Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("Failed to access {}: {}", self.relative, e),
                    ))
                })?;
                let mut temp_file = NamedTempFile::new()?;
                std::io::copy(&mut entry, &mut temp_file)?;
                Ok(LocalFile::Temp(temp_file))
            }
        }
    }
}

/// Create the per-product extraction cache directory under the platform
/// cache location, e.g. `~/.cache/s2mosaic/<reader>/<product>`.
pub fn init_cache_dir(reader_dir: &str, product_name: &str) -> S2Result<PathBuf> {
    let base = dirs::cache_dir().ok_or_else(|| {
        S2Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Unable to determine the platform cache directory",
        ))
    })?;
    let cache_dir = base.join("s2mosaic").join(reader_dir).join(product_name);
    fs::create_dir_all(&cache_dir)?;
    log::debug!("Using cache dir {}", cache_dir.display());
    Ok(cache_dir)
}

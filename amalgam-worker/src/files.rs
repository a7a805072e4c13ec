//! File-system commands proxied through the worker channel.
//!
//! [`FileSystemExtension`] claims the `createLazyFile`, `writeFile`,
//! `readFile`, `unlink`, `mkdir`, `rmdir` and `readdir` commands and runs
//! them against a [`FileSystem`]. [`HostFileSystem`] is the default backend:
//! a directory on the host, with lazy files fetched on first read.

use crate::command::Params;
use crate::error::{FsError, FsResult, ServiceError, ServiceResult};
use crate::messages::Request;
use crate::service::CommandExtension;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Registers `parent/name` whose contents come from `url` on first read.
    async fn create_lazy_file(
        &self,
        parent: &str,
        name: &str,
        url: &str,
        can_read: bool,
        can_write: bool,
    ) -> FsResult<()>;

    async fn write_file(&self, path: &str, data: &[u8], append: bool) -> FsResult<()>;

    async fn read_file(&self, path: &str) -> FsResult<Vec<u8>>;

    async fn unlink(&self, path: &str) -> FsResult<()>;

    async fn mkdir(&self, path: &str, mode: Option<u32>) -> FsResult<()>;

    async fn rmdir(&self, path: &str) -> FsResult<()>;

    /// Entry names of `path`, sorted, without `.` and `..`.
    async fn readdir(&self, path: &str) -> FsResult<Vec<String>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Binary,
    Utf8,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReadOptions {
    encoding: Encoding,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WriteOptions {
    flags: Option<String>,
}

/// A decoded file-system command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSystemOperation {
    CreateLazyFile {
        parent: String,
        name: String,
        url: String,
        can_read: bool,
        can_write: bool,
    },
    WriteFile { path: String, data: Vec<u8>, append: bool },
    ReadFile { path: String, encoding: Encoding },
    Unlink { path: String },
    Mkdir { path: String, mode: Option<u32> },
    Rmdir { path: String },
    Readdir { path: String },
}

impl FileSystemOperation {
    pub const COMMANDS: [&'static str; 7] = [
        "createLazyFile",
        "writeFile",
        "readFile",
        "unlink",
        "mkdir",
        "rmdir",
        "readdir",
    ];

    /// `None` when `request` is not a file-system command.
    pub fn decode(request: &Request) -> Option<ServiceResult<Self>> {
        let command = request.command.as_str();
        if !Self::COMMANDS.contains(&command) {
            return None;
        }
        Some(Self::decode_params(command, &request.parameters))
    }

    fn decode_params(command: &str, values: &[Value]) -> ServiceResult<Self> {
        let mut p = Params::new(command, values);
        Ok(match command {
            "createLazyFile" => Self::CreateLazyFile {
                parent: p.required("parent")?,
                name: p.required("name")?,
                url: p.required("url")?,
                can_read: p.optional("canRead")?.unwrap_or(true),
                can_write: p.optional("canWrite")?.unwrap_or(true),
            },
            "writeFile" => {
                let path = p.required("path")?;
                let data = decode_data(command, p.raw())?;
                let options: WriteOptions = p.or_default("opts")?;
                let append = match options.flags.as_deref() {
                    None | Some("w") => false,
                    Some("a") => true,
                    Some(other) => {
                        return Err(ServiceError::InvalidParameters {
                            command: command.to_string(),
                            detail: format!("unsupported flags '{other}'"),
                        });
                    }
                };
                Self::WriteFile { path, data, append }
            }
            "readFile" => {
                let path = p.required("path")?;
                let options: ReadOptions = p.or_default("opts")?;
                Self::ReadFile {
                    path,
                    encoding: options.encoding,
                }
            }
            "unlink" => Self::Unlink {
                path: p.required("path")?,
            },
            "mkdir" => Self::Mkdir {
                path: p.required("path")?,
                mode: p.optional("mode")?,
            },
            "rmdir" => Self::Rmdir {
                path: p.required("path")?,
            },
            _ => Self::Readdir {
                path: p.required("path")?,
            },
        })
    }

    /// Runs the command. Only `readFile` and `readdir` produce a body.
    pub async fn apply<F: FileSystem + ?Sized>(&self, fs: &F) -> ServiceResult<Option<Value>> {
        match self {
            Self::CreateLazyFile {
                parent,
                name,
                url,
                can_read,
                can_write,
            } => fs.create_lazy_file(parent, name, url, *can_read, *can_write).await?,
            Self::WriteFile { path, data, append } => fs.write_file(path, data, *append).await?,
            Self::ReadFile { path, encoding } => {
                let bytes = fs.read_file(path).await?;
                let body = match encoding {
                    Encoding::Binary => serde_json::to_value(bytes)?,
                    Encoding::Utf8 => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
                };
                return Ok(Some(body));
            }
            Self::Unlink { path } => fs.unlink(path).await?,
            Self::Mkdir { path, mode } => fs.mkdir(path, *mode).await?,
            Self::Rmdir { path } => fs.rmdir(path).await?,
            Self::Readdir { path } => {
                let names = fs.readdir(path).await?;
                return Ok(Some(serde_json::to_value(names)?));
            }
        }
        Ok(None)
    }
}

fn decode_data(command: &str, value: Option<Value>) -> ServiceResult<Vec<u8>> {
    match value {
        Some(Value::String(text)) => Ok(text.into_bytes()),
        Some(value @ Value::Array(_)) => {
            serde_json::from_value(value).map_err(|e| ServiceError::InvalidParameters {
                command: command.to_string(),
                detail: format!("parameter 2 (data): {e}"),
            })
        }
        Some(_) | None => Err(ServiceError::InvalidParameters {
            command: command.to_string(),
            detail: "parameter 2 (data): expected a string or byte array".to_string(),
        }),
    }
}

/// Routes file-system commands to `F`; everything else falls through.
pub struct FileSystemExtension<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> FileSystemExtension<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    pub fn file_system(&self) -> &F {
        &self.fs
    }
}

#[async_trait]
impl<F: FileSystem> CommandExtension for FileSystemExtension<F> {
    async fn handle(&self, request: &Request) -> Option<ServiceResult<Option<Value>>> {
        let operation = match FileSystemOperation::decode(request)? {
            Ok(operation) => operation,
            Err(e) => return Some(Err(e)),
        };
        debug!(command = %request.command, "File-system command");
        Some(operation.apply(&self.fs).await)
    }
}

#[derive(Debug, Clone)]
struct LazyFile {
    url: String,
    can_read: bool,
    can_write: bool,
}

/// A directory on the host exposed as the worker's file system.
///
/// Every path is resolved inside `root`; leading `/` is relative to the
/// root and `..` components are rejected.
pub struct HostFileSystem {
    root: PathBuf,
    lazy: Mutex<HashMap<PathBuf, LazyFile>>,
    http: reqwest::Client,
}

impl HostFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            lazy: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(FsError::InvalidPath(path.to_string()));
                }
            }
        }
        Ok(resolved)
    }

    /// Registered lazy files are materialized on first read.
    pub async fn is_lazy(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(resolved) => self.lazy.lock().await.contains_key(&resolved),
            Err(_) => false,
        }
    }

    async fn fetch(&self, url: &str) -> FsResult<Vec<u8>> {
        let fetch_err = |detail: String| FsError::Fetch {
            url: url.to_string(),
            detail,
        };

        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .http
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| fetch_err(e.to_string()))?;
            let bytes = response.bytes().await.map_err(|e| fetch_err(e.to_string()))?;
            return Ok(bytes.to_vec());
        }

        let local = url.strip_prefix("file://").unwrap_or(url);
        tokio::fs::read(local).await.map_err(|e| fetch_err(e.to_string()))
    }

    /// Fetches a lazy file's contents and writes them to disk.
    async fn materialize(&self, path: &str, resolved: &Path, file: &LazyFile) -> FsResult<Vec<u8>> {
        if !file.can_read {
            return Err(FsError::PermissionDenied(path.to_string()));
        }
        let bytes = self.fetch(&file.url).await?;
        tokio::fs::write(resolved, &bytes)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        self.lazy.lock().await.remove(resolved);
        info!(path = %path, url = %file.url, "Materialized lazy file");
        Ok(bytes)
    }

    async fn lazy_entry(&self, resolved: &Path) -> Option<LazyFile> {
        self.lazy.lock().await.get(resolved).cloned()
    }
}

#[async_trait]
impl FileSystem for HostFileSystem {
    async fn create_lazy_file(
        &self,
        parent: &str,
        name: &str,
        url: &str,
        can_read: bool,
        can_write: bool,
    ) -> FsResult<()> {
        let dir = self.resolve(parent)?;
        let full = format!("{}/{}", parent.trim_end_matches('/'), name);
        let resolved = self.resolve(&full)?;
        if name.is_empty() || resolved.parent() != Some(dir.as_path()) {
            return Err(FsError::InvalidPath(full));
        }

        let meta = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| FsError::from_io(parent, e))?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory(parent.to_string()));
        }

        let mut lazy = self.lazy.lock().await;
        if lazy.contains_key(&resolved) || tokio::fs::try_exists(&resolved).await.unwrap_or(false) {
            return Err(FsError::AlreadyExists(full));
        }
        lazy.insert(
            resolved,
            LazyFile {
                url: url.to_string(),
                can_read,
                can_write,
            },
        );
        debug!(path = %full, url = %url, "Registered lazy file");
        Ok(())
    }

    async fn write_file(&self, path: &str, data: &[u8], append: bool) -> FsResult<()> {
        let resolved = self.resolve(path)?;
        if let Some(file) = self.lazy_entry(&resolved).await {
            if !file.can_write {
                return Err(FsError::PermissionDenied(path.to_string()));
            }
            if append {
                self.materialize(path, &resolved, &file).await?;
            } else {
                self.lazy.lock().await.remove(&resolved);
            }
        }

        if append {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&resolved)
                .await
                .map_err(|e| FsError::from_io(path, e))?;
            file.write_all(data).await.map_err(|e| FsError::from_io(path, e))?;
            file.flush().await.map_err(|e| FsError::from_io(path, e))
        } else {
            tokio::fs::write(&resolved, data)
                .await
                .map_err(|e| FsError::from_io(path, e))
        }
    }

    async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let resolved = self.resolve(path)?;
        if let Some(file) = self.lazy_entry(&resolved).await {
            return self.materialize(path, &resolved, &file).await;
        }
        tokio::fs::read(&resolved).await.map_err(|e| FsError::from_io(path, e))
    }

    async fn unlink(&self, path: &str) -> FsResult<()> {
        let resolved = self.resolve(path)?;
        if self.lazy.lock().await.remove(&resolved).is_some() {
            return Ok(());
        }
        tokio::fs::remove_file(&resolved)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn mkdir(&self, path: &str, mode: Option<u32>) -> FsResult<()> {
        let resolved = self.resolve(path)?;
        tokio::fs::create_dir(&resolved)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        if let Some(mode) = mode {
            set_mode(&resolved, mode)
                .await
                .map_err(|e| FsError::from_io(path, e))?;
        }
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> FsResult<()> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            return Err(FsError::InvalidPath(path.to_string()));
        }
        let has_lazy = self
            .lazy
            .lock()
            .await
            .keys()
            .any(|p| p.parent() == Some(resolved.as_path()));
        if has_lazy {
            return Err(FsError::NotEmpty(path.to_string()));
        }
        tokio::fs::remove_dir(&resolved)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let resolved = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&resolved)
            .await
            .map_err(|e| FsError::from_io(path, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| FsError::from_io(path, e))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        for lazy_path in self.lazy.lock().await.keys() {
            if lazy_path.parent() == Some(resolved.as_path()) {
                if let Some(name) = lazy_path.file_name() {
                    names.push(name.to_string_lossy().into_owned());
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_stays_inside_root() {
        let fs = HostFileSystem::new("/srv/data");
        assert_eq!(fs.resolve("/a/b.txt").unwrap(), PathBuf::from("/srv/data/a/b.txt"));
        assert_eq!(fs.resolve("./a").unwrap(), PathBuf::from("/srv/data/a"));
        assert_eq!(fs.resolve("/").unwrap(), PathBuf::from("/srv/data"));
        assert!(matches!(fs.resolve("../etc/passwd"), Err(FsError::InvalidPath(_))));
        assert!(matches!(fs.resolve("a/../../b"), Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn non_fs_commands_are_not_claimed() {
        let request = Request::new("getVersion", vec![]);
        assert!(FileSystemOperation::decode(&request).is_none());
    }

    #[test]
    fn write_accepts_strings_and_bytes() {
        let text = Request::new("writeFile", vec![json!("a.txt"), json!("hi")]);
        let op = FileSystemOperation::decode(&text).unwrap().unwrap();
        assert_eq!(
            op,
            FileSystemOperation::WriteFile {
                path: "a.txt".into(),
                data: b"hi".to_vec(),
                append: false,
            }
        );

        let bytes = Request::new("writeFile", vec![json!("a.bin"), json!([1, 2, 255]), json!({"flags": "a"})]);
        let op = FileSystemOperation::decode(&bytes).unwrap().unwrap();
        assert_eq!(
            op,
            FileSystemOperation::WriteFile {
                path: "a.bin".into(),
                data: vec![1, 2, 255],
                append: true,
            }
        );
    }

    #[test]
    fn write_rejects_bad_data_and_flags() {
        let bad_data = Request::new("writeFile", vec![json!("a"), json!(5)]);
        assert!(matches!(
            FileSystemOperation::decode(&bad_data).unwrap(),
            Err(ServiceError::InvalidParameters { .. })
        ));

        let bad_byte = Request::new("writeFile", vec![json!("a"), json!([256])]);
        assert!(FileSystemOperation::decode(&bad_byte).unwrap().is_err());

        let bad_flags = Request::new("writeFile", vec![json!("a"), json!("x"), json!({"flags": "r+"})]);
        assert!(FileSystemOperation::decode(&bad_flags).unwrap().is_err());
    }

    #[test]
    fn read_encoding_defaults_to_binary() {
        let request = Request::new("readFile", vec![json!("a")]);
        let op = FileSystemOperation::decode(&request).unwrap().unwrap();
        assert_eq!(
            op,
            FileSystemOperation::ReadFile {
                path: "a".into(),
                encoding: Encoding::Binary,
            }
        );

        let request = Request::new("readFile", vec![json!("a"), json!({"encoding": "utf8"})]);
        let op = FileSystemOperation::decode(&request).unwrap().unwrap();
        assert!(matches!(op, FileSystemOperation::ReadFile { encoding: Encoding::Utf8, .. }));
    }
}

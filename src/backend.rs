//! Log backend seam: the in-process record device or an external
//! character device.
//!
//! The connection handlers and the timestamp injector talk to the log
//! through the [`LogBackend`] trait, so the rest of the server does not care
//! which of the two canonical logs is active:
//!
//! - [`DeviceBackend`] wraps the shared in-process [`LogDevice`]. Every
//!   committed byte is mirrored to a data file on disk, and the file is
//!   removed again at shutdown. Timestamp injection runs in this mode.
//! - [`CharBackend`] hands the byte stream to a character-device node
//!   (normally `/dev/aesdchar`), which performs its own lifecycle and is the
//!   canonical log. The node carries no repositioning command, so seeks are
//!   answered with [`DeviceError::Unsupported`]; no persisted state is
//!   created and the injector stays off.
//!
//! Backend selection is a configuration key; see
//! [`for_settings`] for the factory.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::{debug, info, warn};

use crate::config::{BackendKind, Settings};
use crate::device::LogDevice;
use crate::error::{DeviceError, DeviceResult};

/// The operations the server needs from a log, whichever backend provides it.
pub trait LogBackend: Send + Sync {
    /// Integrates `bytes` into the log; returns the byte count committed.
    fn append(&self, bytes: &[u8]) -> DeviceResult<usize>;

    /// Copies out at most `max` bytes starting at byte offset `fpos`.
    /// An empty result marks the end of the retained log.
    fn read_at(&self, fpos: usize, max: usize) -> DeviceResult<Bytes>;

    /// Resolves a (record index, intra-record offset) pair to an absolute
    /// byte offset.
    fn seek_to(&self, write_cmd: u32, write_cmd_offset: u32) -> DeviceResult<usize>;

    /// True when the periodic timestamp writer should run against this log.
    fn timestamps_enabled(&self) -> bool;

    /// Releases backend state at server shutdown.
    fn shutdown(&self) -> DeviceResult<()>;
}

/// Builds the backend selected by the settings.
pub fn for_settings(settings: &Settings) -> DeviceResult<Arc<dyn LogBackend>> {
    match settings.backend {
        BackendKind::Internal => Ok(Arc::new(DeviceBackend::new(settings.data_file.clone()))),
        BackendKind::CharDevice => {
            let backend = CharBackend::open(&settings.char_device)?;
            Ok(Arc::new(backend))
        }
    }
}

/// In-process log device with an on-disk mirror of the committed bytes.
pub struct DeviceBackend {
    device: LogDevice,
    mirror: Mutex<Option<File>>,
    path: PathBuf,
}

impl DeviceBackend {
    /// Creates the backend; the mirror file is opened on first append.
    pub fn new(path: PathBuf) -> Self {
        Self {
            device: LogDevice::new(),
            mirror: Mutex::new(None),
            path,
        }
    }

    /// Appends `bytes` to the mirror file, opening it on first use. Mirror
    /// failures are logged and swallowed; the in-process device stays the
    /// canonical log.
    fn mirror_append(&self, bytes: &[u8]) {
        let Ok(mut guard) = self.mirror.lock() else {
            return;
        };
        if guard.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(err) => {
                    warn!("cannot open data file {}: {}", self.path.display(), err);
                    return;
                }
            }
        }
        if let Some(file) = guard.as_mut() {
            if let Err(err) = file.write_all(bytes) {
                warn!("data file write failed: {}", err);
            }
        }
    }
}

impl LogBackend for DeviceBackend {
    fn append(&self, bytes: &[u8]) -> DeviceResult<usize> {
        let written = self.device.append(bytes)?;
        self.mirror_append(&bytes[..written]);
        Ok(written)
    }

    fn read_at(&self, fpos: usize, max: usize) -> DeviceResult<Bytes> {
        self.device.read_at(fpos, max)
    }

    fn seek_to(&self, write_cmd: u32, write_cmd_offset: u32) -> DeviceResult<usize> {
        self.device.seek_to(write_cmd, write_cmd_offset)
    }

    fn timestamps_enabled(&self) -> bool {
        true
    }

    fn shutdown(&self) -> DeviceResult<()> {
        let released = self.device.drain()?;
        debug!("released {} retained records", released);

        if let Ok(mut guard) = self.mirror.lock() {
            *guard = None;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!("removed data file {}", self.path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }
}

/// External character-device log. The node owns the ring; this backend only
/// moves bytes across it.
pub struct CharBackend {
    node: Mutex<File>,
    path: PathBuf,
}

impl CharBackend {
    /// Opens the device node read/write.
    pub fn open(path: &Path) -> DeviceResult<Self> {
        let node = OpenOptions::new().read(true).write(true).open(path)?;
        info!("using character device {}", path.display());
        Ok(Self {
            node: Mutex::new(node),
            path: path.to_path_buf(),
        })
    }
}

impl LogBackend for CharBackend {
    fn append(&self, bytes: &[u8]) -> DeviceResult<usize> {
        let mut node = self.node.lock().map_err(|_| DeviceError::Interrupted)?;
        node.write_all(bytes)?;
        Ok(bytes.len())
    }

    fn read_at(&self, fpos: usize, max: usize) -> DeviceResult<Bytes> {
        let node = self.node.lock().map_err(|_| DeviceError::Interrupted)?;
        let mut buf = vec![0u8; max];
        let n = node.read_at(&mut buf, fpos as u64)?;
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    fn seek_to(&self, _write_cmd: u32, _write_cmd_offset: u32) -> DeviceResult<usize> {
        // The device node exposes no repositioning command.
        Err(DeviceError::Unsupported)
    }

    fn timestamps_enabled(&self) -> bool {
        false
    }

    fn shutdown(&self) -> DeviceResult<()> {
        // The node performs its own lifecycle; nothing persisted here.
        debug!("closing character device {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_backend_roundtrip_and_mirror() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("linelogdata");
        let backend = DeviceBackend::new(path.clone());

        backend.append(b"hello\n").expect("append");
        backend.append(b"world\n").expect("append");

        assert_eq!(backend.read_at(0, 1024).expect("read").as_ref(), b"hello\n");
        assert_eq!(backend.seek_to(1, 0).expect("seek"), 6);

        let mirrored = std::fs::read(&path).expect("mirror file");
        assert_eq!(mirrored, b"hello\nworld\n");
    }

    #[test]
    fn test_device_backend_shutdown_removes_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("linelogdata");
        let backend = DeviceBackend::new(path.clone());

        backend.append(b"hello\n").expect("append");
        assert!(path.exists());

        backend.shutdown().expect("shutdown");
        assert!(!path.exists());
        assert!(backend.read_at(0, 16).expect("read").is_empty());
    }

    #[test]
    fn test_device_backend_shutdown_without_traffic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = DeviceBackend::new(dir.path().join("never-created"));
        backend.shutdown().expect("shutdown with no file");
    }

    #[test]
    fn test_char_backend_rejects_seek() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fake-node");
        std::fs::write(&path, b"").expect("create node stand-in");

        let backend = CharBackend::open(&path).expect("open");
        backend.append(b"hello\n").expect("append");
        assert_eq!(backend.read_at(0, 1024).expect("read").as_ref(), b"hello\n");
        assert!(matches!(
            backend.seek_to(0, 0),
            Err(DeviceError::Unsupported)
        ));
        assert!(!backend.timestamps_enabled());
    }

    #[test]
    fn test_char_backend_open_missing_node_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(CharBackend::open(&dir.path().join("absent")).is_err());
    }
}

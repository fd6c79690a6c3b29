//! Character-device source.
//!
//! The node is opened non-blocking and polled for `POLLIN | POLLPRI`; each
//! readiness is followed by exactly one record-sized read.

use simtemp_core::record::RECORD_SIZE;
use simtemp_core::source::{ReadOutcome, SampleSource, SourceError};
use std::fs::{File, OpenOptions};
use std::io::{self, ErrorKind, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_DEVICE_PATH: &str = "/dev/simtemp";

#[derive(Debug)]
pub struct DeviceSource {
    path: PathBuf,
    file: Option<File>,
}

impl DeviceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn open_error(&self, err: io::Error) -> SourceError {
        match err.kind() {
            ErrorKind::NotFound => SourceError::NotFound {
                path: self.path.clone(),
            },
            ErrorKind::PermissionDenied => SourceError::PermissionDenied {
                path: self.path.clone(),
            },
            _ => SourceError::Io {
                path: self.path.clone(),
                detail: err.to_string(),
            },
        }
    }

    fn transport_error(&self, err: io::Error) -> SourceError {
        // The driver answers EIO while tearing down and ENODEV once unbound.
        match err.raw_os_error() {
            Some(libc::EIO | libc::ENODEV | libc::ENXIO) => SourceError::Disconnected {
                path: self.path.clone(),
                detail: err.to_string(),
            },
            _ => SourceError::Io {
                path: self.path.clone(),
                detail: err.to_string(),
            },
        }
    }
}

impl Default for DeviceSource {
    fn default() -> Self {
        Self::new(DEFAULT_DEVICE_PATH)
    }
}

enum Readiness {
    Ready,
    Quiet,
    HungUp(i16),
}

/// Rounds up, so a sub-millisecond wait still blocks instead of spinning.
fn poll_timeout_ms(wait: Duration) -> libc::c_int {
    libc::c_int::try_from(wait.as_micros().div_ceil(1000)).unwrap_or(libc::c_int::MAX)
}

fn wait_readable(file: &File, wait: Duration) -> io::Result<Readiness> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN | libc::POLLPRI,
        revents: 0,
    };
    let timeout_ms = poll_timeout_ms(wait);

    // SAFETY: `pfd` is a single valid pollfd that outlives the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    if rc == 0 {
        return Ok(Readiness::Quiet);
    }
    if pfd.revents & (libc::POLLIN | libc::POLLPRI) != 0 {
        return Ok(Readiness::Ready);
    }
    if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        return Ok(Readiness::HungUp(pfd.revents));
    }
    Ok(Readiness::Quiet)
}

impl SampleSource for DeviceSource {
    fn open(&mut self) -> Result<(), SourceError> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
            .map_err(|err| self.open_error(err))?;

        info!(path = %self.path.display(), "Device opened");
        self.file = Some(file);
        Ok(())
    }

    fn read_one(&mut self, wait: Duration) -> ReadOutcome {
        let Some(file) = self.file.as_mut() else {
            return ReadOutcome::SourceUnavailable(SourceError::NotOpen);
        };

        match wait_readable(file, wait) {
            Ok(Readiness::Ready) => {}
            Ok(Readiness::Quiet) => return ReadOutcome::TimedOut,
            Ok(Readiness::HungUp(revents)) => {
                return ReadOutcome::SourceUnavailable(SourceError::Disconnected {
                    path: self.path.clone(),
                    detail: format!("poll reported revents={revents:#x}"),
                })
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => return ReadOutcome::TimedOut,
            Err(err) => return ReadOutcome::SourceUnavailable(self.transport_error(err)),
        }

        let mut buf = [0u8; RECORD_SIZE];
        match file.read(&mut buf) {
            Ok(n) => ReadOutcome::from_read(&buf[..n]),
            Err(err) if err.kind() == ErrorKind::WouldBlock => ReadOutcome::Empty,
            Err(err) if err.kind() == ErrorKind::Interrupted => ReadOutcome::TimedOut,
            Err(err) => ReadOutcome::SourceUnavailable(self.transport_error(err)),
        }
    }

    fn close(&mut self) {
        if self.file.take().is_some() {
            debug!(path = %self.path.display(), "Device closed");
        }
    }

    fn describe(&self) -> String {
        format!("device({})", self.path.display())
    }
}

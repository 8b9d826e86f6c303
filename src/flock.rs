use std::{
    fs::File,
    path::Path,
    time::{Duration, Instant},
};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

const LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Advisory exclusive lock, released when dropped.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] std::io::Error);

impl FileLock {
    pub fn new(path: &Path) -> Result<Self, Error> {
        let file = File::create(path)?;
        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(true) => {
                    return Ok(Self { _file: file });
                }
                Ok(false) if start.elapsed() < LOCK_TIMEOUT => {
                    debug!("{} is in use by another process, retrying", path.display());
                    std::thread::sleep(Duration::from_secs(1));
                }
                Ok(false) => {
                    return Err(Error(std::io::Error::new(
                        std::io::ErrorKind::WouldBlock,
                        format!("timed out waiting for the lock on {}", path.display()),
                    )))
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}

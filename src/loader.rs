//! CWAV File Loader
//!
//! Reads a whole file into an owned buffer. The buffer is reserved up front
//! from the size the filesystem reports, so an allocation failure surfaces as
//! [`CwavError::FileTooLarge`] instead of aborting.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{CwavError, Result};

/// Read the file at `path` into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let open_error = |source: std::io::Error| CwavError::FileOpen {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).map_err(open_error)?;
    let size = file.metadata().map_err(open_error)?.len();
    let len = usize::try_from(size).map_err(|_| CwavError::FileTooLarge { size })?;

    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|_| CwavError::FileTooLarge { size })?;
    file.read_to_end(&mut data).map_err(open_error)?;
    Ok(data)
}

//! One-time welcome announcement per home directory.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::Utc;

use crate::error::{io_err, InterceptorError};
use crate::paths::{installed_marker_path, state_dir};

/// `true` until the Interceptor has started once for `home`.
pub fn is_pending(home: &Path) -> bool {
    !installed_marker_path(home).exists()
}

/// Create the installed marker. Returns `true` only for the call that
/// actually created it.
pub fn claim(home: &Path) -> Result<bool, InterceptorError> {
    let dir = state_dir(home);
    fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let marker = installed_marker_path(home);
    match OpenOptions::new().write(true).create_new(true).open(&marker) {
        Ok(mut file) => {
            writeln!(file, "{}", Utc::now().to_rfc3339()).map_err(|e| io_err(&marker, e))?;
            Ok(true)
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(io_err(&marker, err)),
    }
}

//! `commitpartial` marker management. A marker's presence means "this
//! commit's reachable objects are not all confirmed present"; its absence
//! means "complete and reachable from a committed ref". The transaction
//! driver (C9) is the only writer; the scan queue (C6) and ref resolver
//! (C4) read it to decide whether a pull can resume cheaply.

use std::fs;
use std::io;
use std::path::PathBuf;

use dagsync_checksum::Checksum;

fn marker_path(state_dir: &std::path::Path, commit: Checksum) -> PathBuf {
    state_dir.join(format!("{}.commitpartial", commit.to_hex()))
}

/// Marks `commit` as partially reachable.
pub fn mark_partial(state_dir: &std::path::Path, commit: Checksum) -> io::Result<()> {
    fs::write(marker_path(state_dir, commit), b"")
}

/// Clears `commit`'s partial marker, called only once every reachable
/// object has been verified present.
pub fn clear_partial(state_dir: &std::path::Path, commit: Checksum) -> io::Result<()> {
    match fs::remove_file(marker_path(state_dir, commit)) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Whether `commit` currently carries a `commitpartial` marker.
#[must_use]
pub fn is_partial(state_dir: &std::path::Path, commit: Checksum) -> bool {
    marker_path(state_dir, commit).is_file()
}

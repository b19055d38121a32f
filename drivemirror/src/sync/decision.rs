use std::fs::Metadata;

/// 1 MiB: local files this close to the declared remote size are kept.
pub const DEFAULT_TOLERANCE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    CreateDirectory,
    Skip,
    Download,
}

/// Decides what to do with a remote file given what is on disk at its
/// destination. A file counts as synced when its size differs from the
/// declared size by strictly less than `tolerance` bytes.
pub fn decide_file(local: Option<&Metadata>, remote_size: u64, tolerance: u64) -> SyncDecision {
    match local {
        Some(meta) if meta.is_file() && within_tolerance(meta.len(), remote_size, tolerance) => {
            SyncDecision::Skip
        }
        _ => SyncDecision::Download,
    }
}

pub fn within_tolerance(local_size: u64, remote_size: u64, tolerance: u64) -> bool {
    local_size.abs_diff(remote_size) < tolerance
}

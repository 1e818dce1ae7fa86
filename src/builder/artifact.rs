//! Artifact naming and source filename validation

use crate::error::{FnplaneError, FnplaneResult};
use rand::Rng;
use std::path::{Component, Path};

/// Length of the random suffix appended to artifact names
pub const SUFFIX_LEN: usize = 6;

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// `<src>-<6 lowercase alphanumerics>`, each character drawn uniformly
pub fn artifact_name<R: Rng + ?Sized>(src_pkg_filename: &str, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.random_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", src_pkg_filename, suffix)
}

/// Reject names that would resolve outside the shared volume
///
/// `.` components are dropped, so `./pkg` names the same package as `pkg`.
pub fn sanitize(src_pkg_filename: &str) -> FnplaneResult<&str> {
    if src_pkg_filename.is_empty() {
        return Err(FnplaneError::invalid("srcPkgFilename must not be empty"));
    }

    let mut normal = 0;
    let mut escapes = false;
    for component in Path::new(src_pkg_filename).components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => escapes = true,
        }
    }
    if escapes || normal == 0 {
        return Err(FnplaneError::invalid(format!(
            "srcPkgFilename must be relative to the shared volume: '{}'",
            src_pkg_filename
        )));
    }

    Ok(src_pkg_filename
        .trim_start_matches("./")
        .trim_start_matches('/'))
}

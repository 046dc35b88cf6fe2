//! Program size gate: decides whether full language analysis is affordable
//! for a project given the aggregate size of its sources.
//!
//! [`evaluate`] is a pure function. File sizes are supplied by the caller
//! (ultimately from the file-system collaborator), never recomputed from
//! content.

use std::path::{Path, PathBuf};

/// Maximum aggregate size of non-TypeScript sources before the language
/// service is disabled for a project.
pub const MAX_PROGRAM_SIZE: u64 = 20 * 1024 * 1024;

/// The gate's verdict for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeGateDecision {
    pub enabled: bool,
    /// The file whose size pushed the program over the limit, for
    /// diagnostics. `None` when `enabled` is true.
    pub exceeded_by: Option<PathBuf>,
}

impl SizeGateDecision {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            exceeded_by: None,
        }
    }

    fn exceeded(path: &Path) -> Self {
        Self {
            enabled: false,
            exceeded_by: Some(path.to_path_buf()),
        }
    }
}

/// Evaluates the size gate over `root_files`.
///
/// TypeScript sources (`.ts`, `.tsx`) are exempt: the limit exists to keep
/// huge untyped JS trees from drowning the analyzer. Declaration files don't
/// count toward the aggregate either, but an individual declaration file
/// larger than the whole limit trips the gate by itself.
pub fn evaluate(
    root_files: &[PathBuf],
    file_size: impl Fn(&Path) -> u64,
    limit: u64,
) -> SizeGateDecision {
    let mut total: u64 = 0;
    for path in root_files {
        if is_declaration_file(path) {
            if file_size(path) > limit {
                return SizeGateDecision::exceeded(path);
            }
            continue;
        }
        if has_typescript_extension(path) {
            continue;
        }
        total = total.saturating_add(file_size(path));
        if total > limit {
            return SizeGateDecision::exceeded(path);
        }
    }
    SizeGateDecision::enabled()
}

fn is_declaration_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".d.ts"))
}

fn has_typescript_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext, "ts" | "tsx"))
}

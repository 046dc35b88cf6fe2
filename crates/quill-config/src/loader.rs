use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use quill_vfs::{normalize_path, FileSystem};

use crate::model::{ConfigSettings, ResolvedConfig};

/// Extensions considered project sources when enumerating root files.
const SOURCE_EXTENSIONS: [&str; 4] = ["ts", "tsx", "js", "jsx"];

/// Directories never enumerated as sources.
const DEFAULT_EXCLUDES: [&str; 1] = ["node_modules"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cyclic extends chain revisits {path}")]
    CyclicExtends { path: PathBuf },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfigFile {
    extends: Option<String>,
    files: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    #[serde(default)]
    compiler_options: Map<String, Value>,
    #[serde(default)]
    references: Vec<RawReference>,
}

#[derive(Debug, Deserialize)]
struct RawReference {
    path: String,
}

/// Resolves `config_path` through its `extends` chain to a fixed point.
///
/// Settings merge nearest-file-wins: the project's own file overrides every
/// extended file, key by key. `references` are never inherited. A revisited
/// path during traversal is a [`ConfigError::CyclicExtends`], not a loop.
pub fn resolve(fs: &dyn FileSystem, config_path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let config_path = normalize_path(config_path);

    // Chain files, own config first.
    let mut chain: Vec<(PathBuf, RawConfigFile)> = Vec::new();
    let mut visited: BTreeSet<PathBuf> = BTreeSet::new();
    let mut next = Some(config_path.clone());

    while let Some(current) = next.take() {
        if !visited.insert(current.clone()) {
            return Err(ConfigError::CyclicExtends { path: current });
        }

        let text = fs
            .read_to_string(&current)
            .map_err(|source| ConfigError::Io {
                path: current.clone(),
                source,
            })?;
        let raw: RawConfigFile = if text.trim().is_empty() {
            RawConfigFile::default()
        } else {
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: current.clone(),
                source,
            })?
        };

        next = raw
            .extends
            .as_deref()
            .map(|extends| resolve_extends_target(&current, extends));
        chain.push((current, raw));
    }

    let extends_chain: Vec<PathBuf> = chain.iter().skip(1).map(|(path, _)| path.clone()).collect();
    let settings = merge_chain(&config_path, &chain);
    let root_files = root_files(fs, &config_path, &settings)?;

    tracing::debug!(
        config = %config_path.display(),
        roots = root_files.len(),
        extended = extends_chain.len(),
        "resolved config",
    );

    Ok(ResolvedConfig {
        config_path,
        root_files,
        settings,
        extends_chain,
    })
}

fn resolve_extends_target(from: &Path, extends: &str) -> PathBuf {
    let base = from.parent().unwrap_or_else(|| Path::new(""));
    let mut target = normalize_path(&base.join(extends));
    if target.extension().is_none() {
        target.set_extension("json");
    }
    target
}

fn merge_chain(config_path: &Path, chain: &[(PathBuf, RawConfigFile)]) -> ConfigSettings {
    let mut settings = ConfigSettings::default();

    // Walk base-most first so nearer files overwrite.
    for (path, raw) in chain.iter().rev() {
        if let Some(files) = &raw.files {
            // `files` entries are relative to the file that declares them;
            // rebase onto the declaring directory so inheritance keeps
            // pointing at the right sources.
            let dir = path.parent().unwrap_or_else(|| Path::new(""));
            settings.files = Some(
                files
                    .iter()
                    .map(|file| normalize_path(&dir.join(file)).display().to_string())
                    .collect(),
            );
        }
        if let Some(exclude) = &raw.exclude {
            settings.exclude = exclude.clone();
        }
        for (key, value) in &raw.compiler_options {
            settings
                .compiler_options
                .insert(key.clone(), value.clone());
        }
    }

    // `references` come from the project's own file only.
    let own = &chain[0].1;
    let own_dir = config_path.parent().unwrap_or_else(|| Path::new(""));
    settings.references = own
        .references
        .iter()
        .map(|reference| reference_config_path(own_dir, &reference.path))
        .collect();

    settings.disable_source_of_project_reference_redirect = settings
        .compiler_options
        .remove("disableSourceOfProjectReferenceRedirect")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);

    settings
}

/// A reference may name a config file directly or the directory containing
/// one; directories mean `<dir>/tsconfig.json`.
fn reference_config_path(own_dir: &Path, reference: &str) -> PathBuf {
    let target = normalize_path(&own_dir.join(reference));
    if target.extension().is_some_and(|ext| ext == "json") {
        target
    } else {
        target.join("tsconfig.json")
    }
}

fn root_files(
    fs: &dyn FileSystem,
    config_path: &Path,
    settings: &ConfigSettings,
) -> Result<Vec<PathBuf>, ConfigError> {
    let dir = config_path.parent().unwrap_or_else(|| Path::new(""));

    if let Some(files) = &settings.files {
        // Explicit lists are taken verbatim (already rebased in merge).
        return Ok(files.iter().map(|file| normalize_path(Path::new(file))).collect());
    }

    let mut roots = Vec::new();
    enumerate_sources(fs, dir, dir, &settings.exclude, &mut roots);
    roots.sort();
    Ok(roots)
}

fn enumerate_sources(
    fs: &dyn FileSystem,
    base: &Path,
    dir: &Path,
    exclude: &[String],
    out: &mut Vec<PathBuf>,
) {
    let Ok(entries) = fs.read_dir(dir) else {
        return;
    };
    for entry in entries {
        let Ok(rel) = entry.strip_prefix(base) else {
            continue;
        };
        if is_excluded(rel, exclude) {
            continue;
        }
        if fs.is_dir(&entry) {
            enumerate_sources(fs, base, &entry, exclude, out);
        } else if is_source_file(&entry) {
            out.push(entry);
        }
    }
}

fn is_excluded(rel: &Path, exclude: &[String]) -> bool {
    let matches = |pattern: &str| {
        let pattern = Path::new(pattern);
        rel == pattern || rel.starts_with(pattern)
    };
    DEFAULT_EXCLUDES.iter().any(|pattern| matches(pattern))
        || exclude.iter().any(|pattern| matches(pattern))
}

fn is_source_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    use quill_vfs::MemoryFs;

    #[test]
    fn empty_config_enumerates_sources() {
        let fs = MemoryFs::new();
        fs.write_file("/p/tsconfig.json", "{}");
        fs.write_file("/p/a.ts", "");
        fs.write_file("/p/sub/b.ts", "");
        fs.write_file("/p/node_modules/dep/index.js", "");
        fs.write_file("/p/readme.md", "");

        let resolved = resolve(&fs, Path::new("/p/tsconfig.json")).unwrap();
        assert_eq!(
            resolved.root_files,
            vec![PathBuf::from("/p/a.ts"), PathBuf::from("/p/sub/b.ts")]
        );
        assert!(resolved.extends_chain.is_empty());
    }

    #[test]
    fn explicit_files_win_over_enumeration() {
        let fs = MemoryFs::new();
        fs.write_file("/p/tsconfig.json", r#"{ "files": ["a.ts"] }"#);
        fs.write_file("/p/a.ts", "");
        fs.write_file("/p/b.ts", "");

        let resolved = resolve(&fs, Path::new("/p/tsconfig.json")).unwrap();
        assert_eq!(resolved.root_files, vec![PathBuf::from("/p/a.ts")]);
    }

    #[test]
    fn exclude_filters_enumerated_sources() {
        let fs = MemoryFs::new();
        fs.write_file("/p/jsconfig.json", r#"{ "exclude": ["largefile.js"] }"#);
        fs.write_file("/p/app.js", "");
        fs.write_file("/p/largefile.js", "");

        let resolved = resolve(&fs, Path::new("/p/jsconfig.json")).unwrap();
        assert_eq!(resolved.root_files, vec![PathBuf::from("/p/app.js")]);
    }

    #[test]
    fn extends_chain_merges_nearest_wins() {
        let fs = MemoryFs::new();
        fs.write_file(
            "/p/base.json",
            r#"{ "compilerOptions": { "strict": true, "target": "es5" } }"#,
        );
        fs.write_file(
            "/p/tsconfig.json",
            r#"{ "extends": "./base.json", "compilerOptions": { "target": "es2020" } }"#,
        );
        fs.write_file("/p/a.ts", "");

        let resolved = resolve(&fs, Path::new("/p/tsconfig.json")).unwrap();
        assert_eq!(resolved.extends_chain, vec![PathBuf::from("/p/base.json")]);
        assert_eq!(
            resolved.settings.compiler_options.get("strict"),
            Some(&serde_json::Value::Bool(true))
        );
        assert_eq!(
            resolved.settings.compiler_options.get("target"),
            Some(&serde_json::Value::String("es2020".into()))
        );
    }

    #[test]
    fn inherited_files_rebase_onto_declaring_dir() {
        let fs = MemoryFs::new();
        fs.write_file("/p/base/tsconfig.json", r#"{ "files": ["main.ts"] }"#);
        fs.write_file(
            "/p/child/tsconfig.json",
            r#"{ "extends": "../base/tsconfig.json" }"#,
        );

        let resolved = resolve(&fs, Path::new("/p/child/tsconfig.json")).unwrap();
        assert_eq!(resolved.root_files, vec![PathBuf::from("/p/base/main.ts")]);
    }

    #[test]
    fn cyclic_extends_is_an_error_not_a_loop() {
        let fs = MemoryFs::new();
        fs.write_file("/p/a.json", r#"{ "extends": "./b.json" }"#);
        fs.write_file("/p/b.json", r#"{ "extends": "./a.json" }"#);

        let err = resolve(&fs, Path::new("/p/a.json")).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicExtends { path } if path == Path::new("/p/a.json")));
    }

    #[test]
    fn unreadable_extended_file_is_an_io_error() {
        let fs = MemoryFs::new();
        fs.write_file("/p/tsconfig.json", r#"{ "extends": "./missing.json" }"#);

        let err = resolve(&fs, Path::new("/p/tsconfig.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { path, .. } if path == Path::new("/p/missing.json")));
    }

    #[test]
    fn references_resolve_directories_to_config_paths() {
        let fs = MemoryFs::new();
        fs.write_file(
            "/p/b/tsconfig.json",
            r#"{ "references": [{ "path": "../a" }] }"#,
        );
        fs.write_file("/p/b/b.ts", "");

        let resolved = resolve(&fs, Path::new("/p/b/tsconfig.json")).unwrap();
        assert_eq!(
            resolved.settings.references,
            vec![PathBuf::from("/p/a/tsconfig.json")]
        );
    }

    #[test]
    fn disable_redirect_flag_is_lifted_out_of_compiler_options() {
        let fs = MemoryFs::new();
        fs.write_file(
            "/p/tsconfig.json",
            r#"{ "compilerOptions": { "disableSourceOfProjectReferenceRedirect": true } }"#,
        );
        fs.write_file("/p/a.ts", "");

        let resolved = resolve(&fs, Path::new("/p/tsconfig.json")).unwrap();
        assert!(resolved.settings.disable_source_of_project_reference_redirect);
        assert!(!resolved
            .settings
            .compiler_options
            .contains_key("disableSourceOfProjectReferenceRedirect"));
    }
}

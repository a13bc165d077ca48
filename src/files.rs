use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use glob::glob;

pub const DEFAULT_RADIO_INFO: &str = "media/audio/RadioInfo_EN.xml";

/// Directories climbed when looking for a misplaced file.
const MAX_ASCENT: usize = 8;

#[derive(Debug, Clone)]
pub struct RadioFile {
    pub path: PathBuf,
    pub len: u64,
}

/// Resolves `--file` and `--glob` arguments, falling back to the default
/// radio info path when neither is given.
pub fn resolve_targets(explicit: &[PathBuf], globs: &[String]) -> Result<Vec<RadioFile>> {
    let mut files = Vec::new();

    if explicit.is_empty() && globs.is_empty() {
        files.push(radio_file(Path::new(DEFAULT_RADIO_INFO))?);
        return Ok(files);
    }

    for path in explicit {
        files.push(radio_file(path)?);
    }

    for pattern in globs {
        let matches =
            glob(pattern).map_err(|err| anyhow!("invalid glob pattern '{pattern}': {err}"))?;
        let before = files.len();
        for entry in matches {
            let path =
                entry.map_err(|err| anyhow!("error reading matches for '{pattern}': {err}"))?;
            if path.is_file() {
                files.push(radio_file(&path)?);
            }
        }
        if files.len() == before {
            println!("warning: glob '{pattern}' matched no files");
        }
    }

    if files.is_empty() {
        bail!("no radio info files matched; provide --file or --glob");
    }

    dedup_by_path(&mut files);
    Ok(files)
}

fn radio_file(path: &Path) -> Result<RadioFile> {
    let metadata = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(suggestion) = suggest_path(path) {
                bail!(
                    "cannot find radio info at {}; did you mean {}?",
                    path.display(),
                    suggestion.display()
                );
            }
            bail!("cannot find radio info at {}", path.display());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading metadata for {}", path.display()));
        }
    };
    if !metadata.is_file() {
        bail!("{} is not a file", path.display());
    }
    Ok(RadioFile {
        path: path.to_path_buf(),
        len: metadata.len(),
    })
}

fn dedup_by_path(files: &mut Vec<RadioFile>) {
    let mut seen = Vec::new();
    files.retain(|file| {
        let key = fs::canonicalize(&file.path).unwrap_or_else(|_| file.path.clone());
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });
}

fn suggest_path(original: &Path) -> Option<PathBuf> {
    let base = std::env::current_dir().ok()?;
    suggest_path_from(&base, original)
}

/// Looks for `needle`, or just its file name, in `base` and its ancestors.
fn suggest_path_from(base: &Path, needle: &Path) -> Option<PathBuf> {
    let file_name = PathBuf::from(needle.file_name()?);
    let mut candidates = vec![needle.to_path_buf()];
    if needle.is_relative() {
        candidates.push(Path::new(DEFAULT_RADIO_INFO).with_file_name(&file_name));
    }
    candidates.push(file_name);

    let mut current = base.to_path_buf();
    for _ in 0..MAX_ASCENT {
        if let Some(hit) = candidates
            .iter()
            .map(|candidate| current.join(candidate))
            .find(|candidate| candidate.is_file())
        {
            return Some(hit);
        }
        if !current.pop() {
            break;
        }
    }
    None
}

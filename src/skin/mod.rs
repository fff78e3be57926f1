//! Adds the Cast button to the host skin and takes it out again.
//!
//! The button lives between two XML comments so it can be found, skipped and
//! removed without parsing the document. Removing it restores the original
//! bytes exactly.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::SkinConfig;
use crate::{CastError, Result};

pub const START_MARKER: &str = "<!-- kastodi start -->";
pub const END_MARKER: &str = "<!-- kastodi end -->";
pub const ANCHOR: &str = "</controls>";

const BUTTON: &str = r#"<control type="button" id="9570">
    <left>1140</left>
    <top>20</top>
    <width>55</width>
    <height>55</height>
    <label>Cast</label>
    <font>-</font>
    <texturefocus>OSDPlaylistFO.png</texturefocus>
    <texturenofocus>OSDPlaylistNF.png</texturenofocus>
    <onclick>RunScript(service.kastodi,cast)</onclick>
</control>
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied { restart_required: bool },
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpatchOutcome {
    Removed,
    AlreadyAbsent,
}

/// The marker-delimited block that gets spliced in.
pub fn fragment() -> String {
    format!("{}\n{}{}", START_MARKER, BUTTON, END_MARKER)
}

pub fn is_patched(document: &str) -> bool {
    document.contains(START_MARKER)
}

/// Insert `fragment` right before the last anchor tag.
pub fn splice_fragment(document: &str, fragment: &str) -> Option<String> {
    let at = document.rfind(ANCHOR)?;
    let mut out = String::with_capacity(document.len() + fragment.len());
    out.push_str(&document[..at]);
    out.push_str(fragment);
    out.push_str(&document[at..]);
    Some(out)
}

/// Remove everything from the start marker through the end marker.
///
/// `Ok(None)` when neither marker is present. A lone marker is an error.
pub fn strip_fragment(document: &str) -> std::result::Result<Option<String>, &'static str> {
    let start = document.find(START_MARKER);
    let end = start
        .and_then(|s| document[s..].find(END_MARKER).map(|e| s + e))
        .or_else(|| document.find(END_MARKER));

    match (start, end) {
        (None, None) => Ok(None),
        (Some(s), Some(e)) if e > s => {
            let mut out = String::with_capacity(document.len());
            out.push_str(&document[..s]);
            out.push_str(&document[e + END_MARKER.len()..]);
            Ok(Some(out))
        }
        (None, Some(_)) => Err(START_MARKER),
        _ => Err(END_MARKER),
    }
}

pub struct SkinPatcher {
    user_dir: PathBuf,
    template_dir: PathBuf,
    document: String,
}

impl SkinPatcher {
    pub fn new(config: &SkinConfig) -> Self {
        Self {
            user_dir: config.user_dir.clone(),
            template_dir: config.template_dir.clone(),
            document: config.document.clone(),
        }
    }

    pub fn document_path(&self) -> PathBuf {
        self.user_dir.join(&self.document)
    }

    pub fn ensure_present(&self) -> Result<PatchOutcome> {
        let path = self.document_path();
        let mut restart_required = false;

        if !path.exists() {
            self.clone_template()?;
            restart_required = true;
        }

        let original = fs::read_to_string(&path)?;
        if is_patched(&original) {
            debug!("Cast button already in {}", path.display());
            // A fresh clone still has to be loaded by the host.
            if restart_required {
                return Ok(PatchOutcome::Applied { restart_required });
            }
            return Ok(PatchOutcome::AlreadyPresent);
        }

        let patched = splice_fragment(&original, &fragment())
            .ok_or_else(|| CastError::MarkerNotFound(format!("{} in {}", ANCHOR, path.display())))?;
        write_atomic(&path, &patched)?;

        info!("Added cast button to {}", path.display());
        Ok(PatchOutcome::Applied { restart_required })
    }

    pub fn ensure_absent(&self) -> Result<UnpatchOutcome> {
        let path = self.document_path();
        if !path.exists() {
            debug!("{} does not exist, nothing to remove", path.display());
            return Ok(UnpatchOutcome::AlreadyAbsent);
        }

        let original = fs::read_to_string(&path)?;
        match strip_fragment(&original) {
            Ok(None) => Ok(UnpatchOutcome::AlreadyAbsent),
            Ok(Some(restored)) => {
                write_atomic(&path, &restored)?;
                info!("Removed cast button from {}", path.display());
                Ok(UnpatchOutcome::Removed)
            }
            Err(missing) => Err(CastError::MarkerNotFound(format!("{} in {}", missing, path.display()))),
        }
    }

    /// Copy the system skin folder into the user location, keeping any file
    /// the user already has.
    fn clone_template(&self) -> Result<()> {
        if !self.template_dir.join(&self.document).is_file() {
            return Err(CastError::SkinFolderMissing(self.template_dir.display().to_string()));
        }

        info!(
            "Cloning skin from {} to {}",
            self.template_dir.display(),
            self.user_dir.display()
        );
        copy_missing(&self.template_dir, &self.user_dir).map_err(|source| CastError::WriteFailed {
            path: self.user_dir.display().to_string(),
            source,
        })
    }
}

fn copy_missing(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let dest = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_missing(&entry.path(), &dest)?;
        } else if !dest.exists() {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Write through a sibling temp file so a crash never leaves half a skin.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let write_failed = |source| CastError::WriteFailed {
        path: path.display().to_string(),
        source,
    };

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{}.kastodi-tmp", file_name));

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(contents.as_bytes())?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            warn!("Could not remove {}: {}", tmp.display(), cleanup);
        }
        return Err(write_failed(e));
    }
    Ok(())
}

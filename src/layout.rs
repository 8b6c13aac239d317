//! Window layout blobs kept between sessions.
//!
//! File format: one length byte `n`, then `n` bytes of window geometry, then
//! the dock/toolbar state blob (everything that remains, never empty). Both
//! blobs are opaque to the engine; the host UI produces and consumes them.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::LayoutError;

/// Largest geometry blob the one-byte length prefix can describe.
pub const MAX_GEOMETRY_LEN: usize = u8::MAX as usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowLayout {
    pub geometry: Vec<u8>,
    pub state: Vec<u8>,
}

impl WindowLayout {
    pub fn to_bytes(&self) -> Result<Vec<u8>, LayoutError> {
        if self.geometry.len() > MAX_GEOMETRY_LEN {
            return Err(LayoutError::GeometryTooLarge(self.geometry.len()));
        }
        if self.state.is_empty() {
            return Err(LayoutError::MissingState);
        }
        let mut out = Vec::with_capacity(1 + self.geometry.len() + self.state.len());
        out.push(self.geometry.len() as u8);
        out.extend_from_slice(&self.geometry);
        out.extend_from_slice(&self.state);
        Ok(out)
    }

    /// Parse a whole layout file. Any mismatch rejects the file outright.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, LayoutError> {
        let Some((&len, rest)) = raw.split_first() else {
            return Err(LayoutError::Truncated {
                expected: 1,
                found: 0,
            });
        };
        let len = len as usize;
        if rest.len() < len {
            return Err(LayoutError::Truncated {
                expected: len,
                found: rest.len(),
            });
        }
        let (geometry, state) = rest.split_at(len);
        if state.is_empty() {
            return Err(LayoutError::MissingState);
        }
        Ok(Self {
            geometry: geometry.to_vec(),
            state: state.to_vec(),
        })
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "layout".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write via a sibling temp file and rename, so readers never see a
/// half-written layout.
pub fn save_layout(path: &Path, layout: &WindowLayout) -> Result<(), LayoutError> {
    let bytes = layout.to_bytes()?;
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    let tmp = temp_sibling(path);
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

pub fn load_layout(path: &Path) -> Result<WindowLayout, LayoutError> {
    let raw = fs::read(path)?;
    WindowLayout::from_bytes(&raw)
}

/// Load for startup: on any failure the caller keeps its current layout and
/// the problem is only logged.
pub fn load_layout_or_warn(path: &Path) -> Option<WindowLayout> {
    match load_layout(path) {
        Ok(layout) => Some(layout),
        Err(e) => {
            log_warn!("Layout {} not restored: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("pmig-layout-{}.bin", uuid::Uuid::new_v4()))
    }

    #[test]
    fn layout_survives_save_and_load() {
        let layout = WindowLayout {
            geometry: vec![1, 2, 3],
            state: vec![9; 40],
        };
        let path = temp_path();
        save_layout(&path, &layout).unwrap();
        assert!(!temp_sibling(&path).exists());
        assert_eq!(load_layout(&path).unwrap(), layout);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn truncated_or_stateless_files_are_rejected_whole() {
        assert!(matches!(
            WindowLayout::from_bytes(&[]),
            Err(LayoutError::Truncated { .. })
        ));
        assert!(matches!(
            WindowLayout::from_bytes(&[5, 1, 2]),
            Err(LayoutError::Truncated {
                expected: 5,
                found: 2
            })
        ));
        assert!(matches!(
            WindowLayout::from_bytes(&[2, 1, 2]),
            Err(LayoutError::MissingState)
        ));
        assert!(load_layout_or_warn(&temp_path()).is_none());
    }

    #[test]
    fn oversized_geometry_cannot_be_written() {
        let layout = WindowLayout {
            geometry: vec![0; 300],
            state: vec![1],
        };
        let path = temp_path();
        assert!(matches!(
            save_layout(&path, &layout),
            Err(LayoutError::GeometryTooLarge(300))
        ));
        assert!(!path.exists());
    }
}

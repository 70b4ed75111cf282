// Filesystem output adapter - hands out files under one output directory

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::{ExportError, ExportResult};
use crate::io::OutputHandle;
use crate::ports::OutputProvider;

/// OutputProvider writing relative names below `root`
#[derive(Debug)]
pub struct DirectoryOutput {
    root: PathBuf,
    created: Vec<PathBuf>,
}

impl DirectoryOutput {
    pub fn new(root: impl Into<PathBuf>) -> ExportResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| ExportError::io(format!("cannot create output directory {}: {}", root.display(), e)))?;
        Ok(Self {
            root,
            created: Vec::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every file handed out so far, in acquisition order
    pub fn created(&self) -> &[PathBuf] {
        &self.created
    }

    fn resolve(&self, relative_name: &str) -> ExportResult<PathBuf> {
        let relative = Path::new(relative_name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if relative_name.is_empty() || escapes {
            return Err(ExportError::invalid(format!(
                "output name '{}' must stay inside the output directory",
                relative_name
            )));
        }
        Ok(self.root.join(relative))
    }

    fn create(&mut self, relative_name: &str) -> ExportResult<File> {
        let path = self.resolve(relative_name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)
            .map_err(|e| ExportError::io(format!("cannot create {}: {}", path.display(), e)))?;
        debug!("Created output {}", path.display());
        self.created.push(path);
        Ok(file)
    }
}

impl OutputProvider for DirectoryOutput {
    fn acquire_frame_output(
        &mut self,
        _frame_index: u32,
        relative_name: &str,
    ) -> ExportResult<Box<dyn OutputHandle>> {
        Ok(Box::new(BufWriter::new(self.create(relative_name)?)))
    }

    fn acquire_container_output(&mut self, relative_name: &str) -> ExportResult<Box<dyn OutputHandle>> {
        // The muxer buffers through its own I/O context
        Ok(Box::new(self.create(relative_name)?))
    }

    fn acquire_audio_output(&mut self, relative_name: &str) -> ExportResult<Box<dyn OutputHandle>> {
        Ok(Box::new(BufWriter::new(self.create(relative_name)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_creates_nested_outputs() {
        let dir = TempDir::new().unwrap();
        let mut output = DirectoryOutput::new(dir.path().join("out")).unwrap();

        let mut handle = output.acquire_frame_output(0, "clip/clip_000000.dng").unwrap();
        handle.write_all(b"data").unwrap();
        drop(handle);

        let path = dir.path().join("out/clip/clip_000000.dng");
        assert_eq!(fs::read(&path).unwrap(), b"data");
        assert_eq!(output.created(), &[path]);
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = TempDir::new().unwrap();
        let mut output = DirectoryOutput::new(dir.path()).unwrap();
        assert!(output.acquire_container_output("../clip.mov").is_err());
        assert!(output.acquire_audio_output("/tmp/clip.wav").is_err());
        assert!(output.acquire_audio_output("").is_err());
    }
}

// src/codegen/output.rs
//! Final output tree: the compiled function files with their resolved
//! text, plus the disk write-out.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::codegen::cmds::McFunctionFile;
use crate::errors::EmitError;

/// The compiled result of one source unit: every `.mcfunction` file,
/// main and init included, with paths relative to the function folder.
#[derive(Debug)]
pub struct Output {
    pub files: Vec<McFunctionFile>,
}

impl Output {
    /// Resolve every file to `(relative path, text)` pairs. Paths get
    /// the `.mcfunction` extension here.
    pub fn text_files(&self) -> Vec<(String, String)> {
        self.files
            .iter()
            .map(|f| (format!("{}.mcfunction", f.path), f.to_text()))
            .collect()
    }

    /// Find a file's resolved text by its extension-less path.
    pub fn file_text(&self, path: &str) -> Option<String> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(McFunctionFile::to_text)
    }

    /// Write the tree under `<out>/<function_folder>/`. With
    /// `override_old` the previous contents of the output directory
    /// are deleted first; otherwise files are overwritten one by one.
    pub fn write(
        &self,
        out_dir: &Path,
        function_folder: &str,
        override_old: bool,
    ) -> Result<(), EmitError> {
        if override_old && out_dir.exists() {
            for entry in fs::read_dir(out_dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
            }
        }

        let mut root = PathBuf::from(out_dir);
        for segment in function_folder.split('/').filter(|s| !s.is_empty()) {
            root.push(segment);
        }

        for (rel, text) in self.text_files() {
            let mut path = root.clone();
            for segment in rel.split('/') {
                path.push(segment);
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            debug!(file = %path.display(), "writing function file");
            fs::write(&path, text)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::cmds::Command;

    #[test]
    fn text_files_add_extension() {
        let mut file = McFunctionFile::new("main");
        file.commands.push(Command::Raw("say hi".to_string()));
        let output = Output { files: vec![file] };
        let texts = output.text_files();
        assert_eq!(texts[0].0, "main.mcfunction");
        assert_eq!(texts[0].1, "say hi");
    }

    #[test]
    fn file_text_lookup() {
        let mut file = McFunctionFile::new("lib/util");
        file.commands.push(Command::Raw("say x".to_string()));
        let output = Output { files: vec![file] };
        assert_eq!(output.file_text("lib/util").unwrap(), "say x");
        assert!(output.file_text("missing").is_none());
    }
}

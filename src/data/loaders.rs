//! Document loaders
//!
//! Plain text and Markdown out of the box, PDF behind the `pdf` feature.

use crate::data::Document;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Load a single file into a [`Document`], picking the reader from the
/// file extension.
pub fn load_file(path: &Path) -> Result<Document> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let content = match ext.as_str() {
        "txt" | "md" | "markdown" => fs::read_to_string(path)
            .with_context(|| format!("failed to read {:?}", path))?,
        #[cfg(feature = "pdf")]
        "pdf" => pdf_extract::extract_text(path)
            .with_context(|| format!("failed to extract text from {:?}", path))?,
        #[cfg(not(feature = "pdf"))]
        "pdf" => anyhow::bail!("PDF support not enabled; compile with --features pdf"),
        other => anyhow::bail!("unsupported file type '{}': {:?}", other, path),
    };

    let mut doc = Document::new(document_id(path), path.to_string_lossy(), content);
    doc.file_type = if ext == "markdown" { "md".to_string() } else { ext };
    Ok(doc)
}

/// Load every supported file under a directory, recursively.
///
/// Unsupported or unreadable files are skipped with a warning rather
/// than aborting the whole ingest.
pub fn load_directory(dir: &Path) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to read directory {:?}", dir))?;

    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            documents.extend(load_directory(&path)?);
        } else {
            match load_file(&path) {
                Ok(doc) => documents.push(doc),
                Err(e) => tracing::warn!("skipping {:?}: {}", path, e),
            }
        }
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(documents)
}

/// Stable document id derived from the file path.
fn document_id(path: &Path) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    path.to_string_lossy().hash(&mut hasher);
    format!("doc_{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_load_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("note.txt");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "plain text body").unwrap();

        let doc = load_file(&path).unwrap();
        assert!(doc.content.contains("plain text body"));
        assert_eq!(doc.file_type, "txt");
    }

    #[test]
    fn test_unsupported_extension_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, b"not text").unwrap();

        assert!(load_file(&path).is_err());
    }

    #[test]
    fn test_load_directory_recurses_and_skips() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "# alpha").unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        fs::write(sub.join("b.txt"), "beta").unwrap();
        fs::write(sub.join("c.bin"), b"\x00").unwrap();

        let docs = load_directory(dir.path()).unwrap();
        assert_eq!(docs.len(), 2);
    }
}

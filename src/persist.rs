//! Document round trip for [`Tree`].
//!
//! Saving renders the filtered export of a tree; private fields never reach
//! disk, so a saved-then-loaded tree equals the exported view of the
//! original rather than the original itself.

use std::path::Path;

use tracing::debug;

use crate::error::FigtreeError;
use crate::tree::Tree;

/// Parse document text into a top-level mapping.
pub fn parse_document(text: &str) -> Result<serde_yaml::Mapping, FigtreeError> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text).map_err(FigtreeError::Parse)?;
    match doc {
        serde_yaml::Value::Mapping(mapping) => Ok(mapping),
        serde_yaml::Value::Null => Ok(serde_yaml::Mapping::new()),
        other => Err(FigtreeError::InvalidSourceType(format!(
            "expected a mapping document, got {other:?}"
        ))),
    }
}

/// Render a mapping back to document text.
pub fn render_document(mapping: &serde_yaml::Mapping) -> Result<String, FigtreeError> {
    serde_yaml::to_string(mapping).map_err(FigtreeError::Render)
}

/// Write the tree's exported view to `path`.
pub fn save(tree: &Tree, path: &Path) -> Result<(), FigtreeError> {
    debug!(path = %path.display(), "saving tree");
    let text = render_document(&tree.export())?;
    std::fs::write(path, text).map_err(|e| FigtreeError::io(path.to_path_buf(), e))
}

/// Read a document file and merge it into `tree`.
pub fn load_into(tree: &mut Tree, path: &Path) -> Result<(), FigtreeError> {
    debug!(path = %path.display(), "loading tree");
    let text =
        std::fs::read_to_string(path).map_err(|e| FigtreeError::io(path.to_path_buf(), e))?;
    let mapping = parse_document(&text)?;
    tree.merge(Tree::from_mapping(mapping)?);
    Ok(())
}

/// Read a document file into a fresh tree.
pub fn load_new(path: &Path) -> Result<Tree, FigtreeError> {
    let mut tree = Tree::new();
    load_into(&mut tree, path)?;
    Ok(tree)
}

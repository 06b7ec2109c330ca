use merge_engine::{render_node, Conflict, DeclTree, MergeOutput, PrinterConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A merge conflict with both sides rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub key: String,
    pub left_label: String,
    pub right_label: String,
    pub left: String,
    pub right: String,
}

impl ConflictReport {
    pub fn from_conflict(tree: &DeclTree, conflict: &Conflict, config: &PrinterConfig) -> Self {
        Self {
            key: conflict.key.clone(),
            left_label: conflict.left_label.clone(),
            right_label: conflict.right_label.clone(),
            left: render_node(tree, conflict.left, config),
            right: render_node(tree, conflict.right, config),
        }
    }

    /// One report per recorded conflict, in detection order.
    pub fn collect(output: &MergeOutput, config: &PrinterConfig) -> Vec<Self> {
        output
            .conflicts
            .iter()
            .map(|conflict| Self::from_conflict(&output.tree, conflict, config))
            .collect()
    }
}

pub fn save_reports(path: &Path, reports: &[ConflictReport]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(reports)?;
    std::fs::write(path, content)?;
    Ok(())
}

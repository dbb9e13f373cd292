use crate::error::{ActionError, ActionResult};
use crate::model::ActionDocument;
use crate::schema::compile;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions tried, in order, when an action is referenced without one.
pub const DOCUMENT_EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Parse an action document from YAML or JSON text.
pub fn parse_str(text: &str, origin: Option<&Path>) -> ActionResult<ActionDocument> {
    let label = || {
        origin
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<inline>".to_string())
    };
    let value: Value = serde_yaml::from_str(text).map_err(|e| ActionError::document(label(), e.to_string()))?;
    compile(value, origin.map(Path::to_path_buf))
}

pub fn load_file<P: AsRef<Path>>(path: P) -> ActionResult<ActionDocument> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        ActionError::document(path.display().to_string(), format!("cannot read file: {}", e))
    })?;
    let document = parse_str(&text, Some(path))?;
    tracing::debug!(action = %document.name, path = %path.display(), steps = document.steps.len(), "loaded action");
    Ok(document)
}

/// Find the file an action reference points to.
///
/// The reference is tried as a path (relative to `base_dir` when given), then
/// with each of [`DOCUMENT_EXTENSIONS`] appended, then the same inside `actions_dir`.
pub fn resolve_reference(
    reference: &str,
    base_dir: Option<&Path>,
    actions_dir: Option<&Path>,
) -> ActionResult<PathBuf> {
    let reference_path = Path::new(reference);
    let mut roots: Vec<Option<&Path>> = vec![base_dir];
    if actions_dir.is_some() && !reference_path.is_absolute() {
        roots.push(actions_dir);
    }

    for root in roots {
        let candidate = match root {
            Some(root) if !reference_path.is_absolute() => root.join(reference_path),
            _ => reference_path.to_path_buf(),
        };
        if candidate.is_file() {
            return Ok(candidate);
        }
        if candidate.extension().is_none() {
            for ext in DOCUMENT_EXTENSIONS {
                let with_ext = candidate.with_extension(ext);
                if with_ext.is_file() {
                    return Ok(with_ext);
                }
            }
        }
    }
    Err(ActionError::configuration(format!("action '{}' not found", reference)))
}

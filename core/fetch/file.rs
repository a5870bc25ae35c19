use crate::error::{AppError, Result};
use crate::fetch::FetchContext;
use crate::matcher;
use crate::model::FileSource;
use crate::modifier::extension_of;
use std::fs;

/// Matches files, optionally prefixes the rendered tree view, then emits
/// each file as a `// Path:` header followed by its modifier-chain output.
pub(crate) fn fetch(source: &FileSource, ctx: &FetchContext) -> Result<String> {
    let result = matcher::find(
        &source.filter,
        &source.directories,
        &source.files,
        ctx.base_path,
        &source.tree_options,
    )?;

    let mut out = String::new();
    if source.include_tree && !result.tree_view.is_empty() {
        out.push_str(&result.tree_view);
        out.push('\n');
    }

    for file in &result.files {
        ctx.cancel.check()?;
        let bytes = fs::read(&file.path).map_err(|e| AppError::FileRead {
            path: file.path.clone(),
            source: e,
        })?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        let extension = extension_of(&file.relative_path.to_string_lossy());
        let modified = ctx
            .registry
            .apply_chain(&source.common.modifiers, &extension, content)?;

        out.push_str("// Path: ");
        out.push_str(&file.relative_path.to_string_lossy());
        out.push('\n');
        out.push_str(&modified);
        if !modified.ends_with('\n') {
            out.push('\n');
        }
        out.push('\n');
    }

    Ok(out)
}

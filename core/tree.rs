use crate::model::TreeOptions;
use byte_unit::{Byte, UnitType};
use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;

/// Renders a deterministic ASCII tree from a flat list of paths relative to
/// `base_path`. Paths with a trailing slash are treated as directories;
/// intermediate components always are. Metadata decoration is looked up
/// under `base_path` and silently omitted when a path cannot be stat'ed.
pub fn render(paths: &[String], base_path: &Path, options: &TreeOptions) -> String {
    let mut roots: Vec<TreeNode> = Vec::new();
    for raw in paths {
        let is_dir_hint = raw.trim_end().ends_with('/') || raw.trim_end().ends_with('\\');
        let normalized = normalize_path(raw);
        if normalized.is_empty() {
            continue;
        }
        let components: Vec<&str> = normalized.split('/').collect();
        insert_node(&mut roots, &components, is_dir_hint, String::new());
    }

    if roots.is_empty() {
        return String::new();
    }

    sort_level(&mut roots);
    let mut out = String::new();
    render_level(&roots, "", 1, base_path, options, &mut out);
    out
}

/// Normalizes separators to `/`, strips drive-letter prefixes and leading
/// `./` markers, and drops trailing slashes, so mixed-platform path lists
/// compare identically.
pub fn normalize_path(raw: &str) -> String {
    let mut s = raw.trim().replace('\\', "/");
    let bytes = s.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        s = s[2..].to_string();
    }
    let s = s.trim_start_matches("./").trim_matches('/');
    // Collapse duplicate separators left by the trims above.
    s.split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug)]
struct TreeNode {
    name: String,
    is_dir: bool,
    rel_path: String,
    children: Vec<TreeNode>,
}

fn insert_node(level: &mut Vec<TreeNode>, components: &[&str], is_dir_hint: bool, parent: String) {
    let Some((name, rest)) = components.split_first() else {
        return;
    };
    let is_last = rest.is_empty();
    let rel_path = if parent.is_empty() {
        (*name).to_string()
    } else {
        format!("{}/{}", parent, name)
    };

    let index = match level.iter().position(|n| n.name == *name) {
        Some(index) => {
            // Descending through an existing leaf promotes it to a directory.
            if !is_last || is_dir_hint {
                level[index].is_dir = true;
            }
            index
        }
        None => {
            level.push(TreeNode {
                name: (*name).to_string(),
                is_dir: !is_last || is_dir_hint,
                rel_path: rel_path.clone(),
                children: Vec::new(),
            });
            level.len() - 1
        }
    };

    if !is_last {
        insert_node(&mut level[index].children, rest, is_dir_hint, rel_path);
    }
}

/// Directories sort before files at every level; within a group the order
/// is lexicographic. Parents therefore always precede their descendants in
/// the rendered output.
fn sort_level(level: &mut Vec<TreeNode>) {
    level.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    for node in level.iter_mut() {
        sort_level(&mut node.children);
    }
}

fn render_level(
    level: &[TreeNode],
    prefix: &str,
    depth: usize,
    base_path: &Path,
    options: &TreeOptions,
    out: &mut String,
) {
    let visible: Vec<&TreeNode> = level
        .iter()
        .filter(|n| options.include_files || n.is_dir)
        .collect();
    let count = visible.len();
    for (i, node) in visible.into_iter().enumerate() {
        let last = i + 1 == count;
        let connector = if last { "└── " } else { "├── " };
        out.push_str(prefix);
        out.push_str(connector);
        out.push_str(&node.name);
        let decoration = decorate(node, base_path, options);
        if !decoration.is_empty() {
            out.push(' ');
            out.push_str(&decoration);
        }
        out.push('\n');

        if node.children.is_empty() {
            continue;
        }
        if options.max_depth > 0 && depth >= options.max_depth {
            continue;
        }
        let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
        render_level(&node.children, &child_prefix, depth + 1, base_path, options, out);
    }
}

fn decorate(node: &TreeNode, base_path: &Path, options: &TreeOptions) -> String {
    if !(options.show_size || options.show_last_modified || options.show_char_count) {
        return String::new();
    }
    let absolute = base_path.join(&node.rel_path);
    let metadata = match fs::metadata(&absolute) {
        Ok(m) => m,
        Err(e) => {
            log::trace!("No metadata for {}: {}", absolute.display(), e);
            return String::new();
        }
    };

    let mut parts: Vec<String> = Vec::new();
    if options.show_size && !node.is_dir {
        let adjusted = Byte::from_u64(metadata.len()).get_appropriate_unit(UnitType::Decimal);
        parts.push(format!("{:.1}", adjusted));
    }
    if options.show_char_count && !node.is_dir {
        if let Ok(content) = fs::read_to_string(&absolute) {
            parts.push(format!("{} chars", content.chars().count()));
        }
    }
    if options.show_last_modified {
        if let Ok(mtime) = metadata.modified() {
            let local: DateTime<Local> = DateTime::from(mtime);
            parts.push(local.format("%Y-%m-%d %H:%M").to_string());
        }
    }

    if parts.is_empty() {
        String::new()
    } else {
        format!("[{}]", parts.join(", "))
    }
}

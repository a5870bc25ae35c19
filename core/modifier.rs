use crate::error::Result;
use crate::model::ModifierRef;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub mod sanitizer;
pub mod structural;

/// Free-form per-reference options, as declared by the config layer.
pub type ModifierOptions = BTreeMap<String, serde_json::Value>;

/// A named, composable, conditionally-applied text transform. Implementations
/// must be stateless: the compiler may run fetches for independent documents
/// concurrently.
pub trait Modifier: Send + Sync {
    /// Whether this modifier applies to files with the given extension
    /// (lowercase, without the dot).
    fn supports(&self, extension: &str) -> bool;

    fn modify(&self, content: &str, options: &ModifierOptions) -> Result<String>;
}

/// Maps modifier identifiers to implementations. `new()` pre-registers the
/// built-in families; embedders can add their own transforms on top.
pub struct ModifierRegistry {
    modifiers: HashMap<String, Arc<dyn Modifier>>,
}

impl ModifierRegistry {
    pub fn new() -> Self {
        let mut registry = ModifierRegistry {
            modifiers: HashMap::new(),
        };
        registry.register("sanitize", Arc::new(sanitizer::Sanitizer));
        registry.register("structure", Arc::new(structural::StructuralFilter::new()));
        registry
    }

    pub fn empty() -> Self {
        ModifierRegistry {
            modifiers: HashMap::new(),
        }
    }

    pub fn register(&mut self, identifier: &str, modifier: Arc<dyn Modifier>) {
        self.modifiers.insert(identifier.to_string(), modifier);
    }

    pub fn get(&self, identifier: &str) -> Option<&Arc<dyn Modifier>> {
        self.modifiers.get(identifier)
    }

    /// Applies a source's modifier list in declaration order; each modifier
    /// receives the output of the previous one. A reference to an unknown
    /// identifier is tolerated with a warning and passes content through; a
    /// modifier that does not support the extension is a silent no-op.
    pub fn apply_chain(
        &self,
        refs: &[ModifierRef],
        extension: &str,
        content: String,
    ) -> Result<String> {
        let mut current = content;
        for modifier_ref in refs {
            let Some(modifier) = self.get(&modifier_ref.identifier) else {
                log::warn!(
                    "Unknown modifier identifier \"{}\"; content passed through unmodified",
                    modifier_ref.identifier
                );
                continue;
            };
            if !modifier.supports(extension) {
                log::trace!(
                    "Modifier \"{}\" does not support extension \"{}\", skipping",
                    modifier_ref.identifier,
                    extension
                );
                continue;
            }
            log::trace!("Applying modifier \"{}\"", modifier_ref.identifier);
            current = modifier.modify(&current, &modifier_ref.options)?;
        }
        Ok(current)
    }
}

impl Default for ModifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased extension of a path-like string, without the dot.
pub fn extension_of(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

use crate::error::Result;
use crate::model::TextSource;

/// Returns the configured literal content verbatim; modifiers never apply
/// to text sources.
pub(crate) fn fetch(source: &TextSource) -> Result<String> {
    Ok(source.content.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceCommon, TextSource};

    #[test]
    fn text_is_returned_verbatim() {
        let source = TextSource {
            common: SourceCommon::default(),
            content: "  hello\n\nworld  ".to_string(),
        };
        assert_eq!(fetch(&source).unwrap(), "  hello\n\nworld  ");
    }
}

use serde::{Deserialize, Serialize};

/// An error carrying a human readable context and, if the failure was propagated from
/// somewhere else, the message of the underlying error.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContextError {
    pub context: String,
    pub source_error: Option<String>,
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source_error {
            Some(source_error) => write!(
                formatter,
                "{}: {}",
                self.context,
                minimize_first_letter(source_error.to_string()),
            ),
            None => write!(formatter, "{}", self.context),
        }
    }
}

impl std::error::Error for ContextError {}

impl ContextError {
    /// Create a new `ContextError` with the given context.
    pub fn with_context<S: Into<String>>(context: S) -> ContextError {
        ContextError {
            context: context.into(),
            source_error: None,
        }
    }

    /// Create a new `ContextError` with the given context and source error.
    pub fn with_error<S: Into<String>>(context: S, error: &dyn std::error::Error) -> ContextError {
        ContextError {
            context: context.into(),
            source_error: Some(error.to_string()),
        }
    }

    /// Wrap this error into an outer context, keeping the whole chain in the message.
    pub fn within<S: Into<String>>(self, context: S) -> ContextError {
        ContextError::with_error(context, &self)
    }
}

/// Minimizes the first letter of a string, it is used for standardizing the error message.
fn minimize_first_letter(string: String) -> String {
    let mut characters = string.chars();
    match characters.next() {
        None => String::new(),
        Some(character) => character.to_lowercase().chain(characters).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::ContextError;

    #[test]
    fn chained_errors_are_displayed_in_order() {
        let error = ContextError::with_context("Failed to decode the image")
            .within("Failed to rasterize page 2")
            .within("Failed to export the letter");

        assert_eq!(
            error.to_string(),
            "Failed to export the letter: failed to rasterize page 2: failed to decode the image"
        );
    }

    #[test]
    fn errors_without_a_source_only_show_the_context() {
        let error = ContextError::with_context("Nothing to export");
        assert_eq!(error.source_error, None);
        assert_eq!(error.to_string(), "Nothing to export");
    }
}

//! Command parts and POSIX shell quoting.

use shlex::QuoteError;

/// Quote one word for a POSIX shell.
///
/// # Errors
/// Returns error if the word contains a NUL byte.
pub fn quote(word: &str) -> Result<String, QuoteError> {
    shlex::try_quote(word).map(std::borrow::Cow::into_owned)
}

/// Quote every word and join them with single spaces.
///
/// # Errors
/// Returns error if any word contains a NUL byte.
pub fn quote_all<I>(words: I) -> Result<String, QuoteError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let quoted = words
        .into_iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(quoted.join(" "))
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn extend_args<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.args.extend(more.into_iter().map(Into::into));
        self
    }

    /// Program followed by its arguments.
    #[must_use]
    pub fn to_argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Render as a single shell command line, every word quoted.
    ///
    /// # Errors
    /// Returns error if any word contains a NUL byte.
    pub fn render(&self) -> Result<String, QuoteError> {
        quote_all(self.to_argv())
    }
}

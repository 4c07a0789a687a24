use thiserror::Error;

/// Errors raised by the shared preference plumbing.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Error types buildable from a free-form message.
///
/// Crates implement this for their own `Error` and then call
/// [`impl_context!`] next to it to get `.context()` on results and options.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;

    /// Prefix an underlying failure with what was being attempted.
    fn wrap(context: &str, source: &dyn std::fmt::Display) -> Self {
        Self::from_message(format!("{context}: {source}"))
    }
}

/// Define a crate-local `Context` extension trait over the crate's
/// `Error` and `Result`.
///
/// ```ignore
/// skillsyoga_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T>;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.map_err(|e| <Error as $crate::FromMessage>::wrap(&context.into(), &e))
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.map_err(|e| <Error as $crate::FromMessage>::wrap(&f().into(), &e))
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(context.into()))
            }

            fn with_context<C: Into<String>>(self, f: impl FnOnce() -> C) -> Result<T> {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Convenience alias for results carrying a crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by runtime construction and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("executor error: {0}")]
    Executor(String),

    #[error("runtime not initialized")]
    NotInitialized,

    #[error("already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Task(#[from] TaskError),
}

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }
}

/// A failure captured inside a deferred task.
///
/// Cloning is cheap (the representation is shared), so every observer of a
/// failed task sees the same failure, and wrapped errors keep their original
/// `source()` chain rather than being flattened into a message.
#[derive(Debug, Clone)]
pub struct TaskError {
    repr: Arc<Repr>,
}

#[derive(Debug)]
enum Repr {
    Message(String),
    Source(Box<dyn std::error::Error + Send + Sync>),
    Panic(String),
}

impl TaskError {
    /// A failure described only by a message.
    pub fn msg<S: Into<String>>(msg: S) -> Self {
        Self {
            repr: Arc::new(Repr::Message(msg.into())),
        }
    }

    /// Wrap an arbitrary error, keeping it reachable through `source()`.
    pub fn from_error<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            repr: Arc::new(Repr::Source(Box::new(err))),
        }
    }

    /// Build a failure out of a caught panic payload.
    pub(crate) fn panicked(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };

        Self {
            repr: Arc::new(Repr::Panic(message)),
        }
    }

    /// Whether this failure came from a panic rather than a returned error.
    pub fn is_panic(&self) -> bool {
        matches!(&*self.repr, Repr::Panic(_))
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.repr {
            Repr::Message(msg) => f.write_str(msg),
            Repr::Source(err) => fmt::Display::fmt(err, f),
            Repr::Panic(msg) => write!(f, "task panicked: {}", msg),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.repr {
            Repr::Source(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

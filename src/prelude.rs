pub use crate::config::{Config, ConfigBuilder, ThreadPriority};
pub use crate::context::AmbientContext;
pub use crate::error::{Error, Result, TaskError};
pub use crate::runtime::Runtime;
pub use crate::task::{Deferred, ValueTask};
pub use crate::telemetry::{Metrics, MetricsSnapshot};

pub use crate::{init, init_with_config, shutdown};

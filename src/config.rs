use crate::error::{Error, Result};

/// Scheduling priority applied to every pool worker thread at startup.
///
/// On Linux this maps to the thread's nice value; elsewhere it is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadPriority {
    Low,
    Normal,
    High,
}

impl Default for ThreadPriority {
    fn default() -> Self {
        ThreadPriority::Normal
    }
}

impl ThreadPriority {
    #[cfg(target_os = "linux")]
    pub(crate) fn nice_value(self) -> i32 {
        match self {
            ThreadPriority::Low => 10,
            ThreadPriority::Normal => 0,
            // Raising priority needs CAP_SYS_NICE; failure is logged, not fatal.
            ThreadPriority::High => -5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Worker count; `None` means available hardware parallelism.
    pub num_threads: Option<usize>,
    pub thread_priority: ThreadPriority,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: None,
            thread_priority: ThreadPriority::default(),
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "deft-worker".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_threads {
            if n == 0 {
                return Err(Error::config("num_threads must be > 0"));
            }
            if n > 1024 {
                return Err(Error::config("num_threads too large (max 1024)"));
            }
        }

        Ok(())
    }

    /// Resolved worker count: the configured value, or one thread per
    /// available CPU, never less than 1.
    pub fn worker_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = Some(n);
        self
    }

    pub fn thread_priority(mut self, priority: ThreadPriority) -> Self {
        self.config.thread_priority = priority;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

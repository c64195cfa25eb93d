//! Configuration Module - Reference Processing Tunables
//!
//! Construction parameters of a [`ReferenceProcessor`](crate::ReferenceProcessor)
//! plus the handful of global switches a collector exposes for reference
//! handling (registration on/off, parallel processing, balancing, per-thread
//! work estimate, soft reference LRU rate).

/// Which soft reference policy is used when soft references are not cleared
/// unconditionally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftRefPolicyKind {
    /// Interval scales with free space at the last collection
    LruCurrentHeap,
    /// Interval scales with (max heap - used at last collection)
    LruMaxHeap,
}

/// What `discover_reference` reports for an object that is already linked
/// into a discovered list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RediscoveryPolicy {
    /// Report it as discovered so the caller does not trace the referent.
    ///
    /// Needed by collectors that may restart concurrent marking and rescan
    /// reference objects they have already discovered.
    TreatAsDiscovered,
    /// Report it as not discovered; the caller treats the reference strongly
    Ignore,
}

/// Main configuration for reference processing
///
/// # Examples
///
/// ```rust
/// use refproc::RefProcConfig;
///
/// let config = RefProcConfig {
///     mt_processing_degree: 4,
///     mt_discovery_degree: 4,
///     concurrent_discovery: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RefProcConfig {
    /// Number of queues processed in parallel
    ///
    /// Default: min(4, num_cpus / 2), at least 1
    pub mt_processing_degree: usize,

    /// Number of threads that discover references concurrently
    ///
    /// Each discovering thread appends to its own queue, so a degree above 1
    /// switches discovery to the compare-and-exchange path.
    ///
    /// Default: 1
    pub mt_discovery_degree: usize,

    /// Discovery runs while mutators run
    ///
    /// Mutators may then clear referents between discovery and processing.
    ///
    /// Default: false
    pub concurrent_discovery: bool,

    /// Global switch for reference discovery
    ///
    /// Default: true
    pub register_references: bool,

    /// Allow processing queues on multiple worker threads
    ///
    /// Default: true
    pub parallel_ref_proc_enabled: bool,

    /// Rebalance queues before every parallel phase
    ///
    /// Queues beyond the active degree are drained regardless of this flag.
    ///
    /// Default: true
    pub parallel_ref_proc_balancing_enabled: bool,

    /// Estimated references one worker handles per phase
    ///
    /// 0 means always use every available worker.
    ///
    /// Default: 1000
    pub references_per_thread: usize,

    /// Milliseconds a soft reference survives per free megabyte
    ///
    /// Default: 1000
    pub soft_ref_lru_policy_ms_per_mb: i64,

    /// Soft reference policy used when not clearing all soft references
    ///
    /// Default: LruMaxHeap
    pub soft_ref_policy: SoftRefPolicyKind,

    /// Processor count used to cap parallelism
    ///
    /// If None, uses num_cpus::get()
    pub active_processor_count: Option<usize>,

    /// Behaviour for references found already discovered
    ///
    /// Default: TreatAsDiscovered
    pub rediscovery: RediscoveryPolicy,

    /// Log phase summaries at info level
    ///
    /// Default: false
    pub verbose: bool,

    /// Emit log events as JSON lines
    ///
    /// Default: false
    pub json_log: bool,
}

impl Default for RefProcConfig {
    fn default() -> Self {
        let num_cpus = num_cpus::get();

        RefProcConfig {
            // Threading
            mt_processing_degree: (num_cpus / 2).clamp(1, 4),
            mt_discovery_degree: 1,
            concurrent_discovery: false,

            // Global switches
            register_references: true,
            parallel_ref_proc_enabled: true,
            parallel_ref_proc_balancing_enabled: true,
            references_per_thread: 1000,

            // Soft references
            soft_ref_lru_policy_ms_per_mb: 1000,
            soft_ref_policy: SoftRefPolicyKind::LruMaxHeap,

            active_processor_count: None,
            rediscovery: RediscoveryPolicy::TreatAsDiscovered,

            // Debug
            verbose: false,
            json_log: false,
        }
    }
}

impl RefProcConfig {
    /// Configuration for single-threaded, stop-the-world discovery and processing
    pub fn serial() -> Self {
        RefProcConfig {
            mt_processing_degree: 1,
            mt_discovery_degree: 1,
            ..Default::default()
        }
    }

    /// Validate configuration
    ///
    /// # Examples
    ///
    /// ```rust
    /// use refproc::RefProcConfig;
    ///
    /// let config = RefProcConfig {
    ///     mt_discovery_degree: 0, // Invalid!
    ///     ..Default::default()
    /// };
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mt_processing_degree == 0 {
            return Err(ConfigError::InvalidDegree(
                "mt_processing_degree must be > 0".to_string(),
            ));
        }

        if self.mt_discovery_degree == 0 {
            return Err(ConfigError::InvalidDegree(
                "mt_discovery_degree must be > 0".to_string(),
            ));
        }

        if self.max_num_queues() > MAX_QUEUES {
            return Err(ConfigError::InvalidDegree(format!(
                "at most {} queues are supported, got {}",
                MAX_QUEUES,
                self.max_num_queues()
            )));
        }

        if self.soft_ref_lru_policy_ms_per_mb < 0 {
            return Err(ConfigError::InvalidSoftRefPolicy(
                "soft_ref_lru_policy_ms_per_mb must be >= 0".to_string(),
            ));
        }

        if let Some(0) = self.active_processor_count {
            return Err(ConfigError::InvalidProcessorCount(
                "active_processor_count must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Queue count per reference kind
    pub fn max_num_queues(&self) -> usize {
        self.mt_processing_degree.max(self.mt_discovery_degree)
    }

    /// Processor count used by the degree adjuster
    pub fn processor_count(&self) -> usize {
        self.active_processor_count.unwrap_or_else(num_cpus::get)
    }

    /// Build configuration from environment variables
    ///
    /// Overrides defaults with:
    /// - REFPROC_PROCESSING_DEGREE
    /// - REFPROC_DISCOVERY_DEGREE
    /// - REFPROC_CONCURRENT_DISCOVERY
    /// - REFPROC_REFS_PER_THREAD
    /// - REFPROC_BALANCING
    /// - REFPROC_VERBOSE
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REFPROC_PROCESSING_DEGREE") {
            if let Ok(degree) = val.parse::<usize>() {
                config.mt_processing_degree = degree;
            }
        }

        if let Ok(val) = std::env::var("REFPROC_DISCOVERY_DEGREE") {
            if let Ok(degree) = val.parse::<usize>() {
                config.mt_discovery_degree = degree;
            }
        }

        if let Ok(val) = std::env::var("REFPROC_CONCURRENT_DISCOVERY") {
            config.concurrent_discovery = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("REFPROC_REFS_PER_THREAD") {
            if let Ok(count) = val.parse::<usize>() {
                config.references_per_thread = count;
            }
        }

        if let Ok(val) = std::env::var("REFPROC_BALANCING") {
            config.parallel_ref_proc_balancing_enabled = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("REFPROC_VERBOSE") {
            config.verbose = parse_flag(&val);
        }

        config
    }
}

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid degree: {0}")]
    InvalidDegree(String),

    #[error("Invalid soft reference policy: {0}")]
    InvalidSoftRefPolicy(String),

    #[error("Invalid processor count: {0}")]
    InvalidProcessorCount(String),
}

/// Upper bound on queues per kind; keeps the list array small and index math
/// in range of the worker id type
const MAX_QUEUES: usize = 1024;

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

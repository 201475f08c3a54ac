use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use beacon_transport::TransportConfig;
use serde_json::Value;

use crate::election::{BasicLeadershipElection, LeadershipElection, NoLeadershipElection};
use crate::error::ConfigError;
use crate::types::LocalIdentity;

// ── Weight ───────────────────────────────────────────────────────────

/// Election rank of this instance. Higher wins; ties never take over.
#[derive(Clone)]
pub enum Weight {
    Fixed(f64),
    /// Re-evaluated before every outgoing `hello`.
    Dynamic(Arc<dyn Fn() -> f64 + Send + Sync>),
}

impl Weight {
    pub fn dynamic(f: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        Weight::Dynamic(Arc::new(f))
    }

    /// Default weight: `-(now_ms / 10^digits(now_ms))`.
    ///
    /// Falls in (-1, 0) and decreases with wall-clock time, so instances
    /// started later rank lower.
    pub fn startup() -> Self {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as f64)
            .unwrap_or(0.0);
        if now_ms < 1.0 {
            return Weight::Fixed(0.0);
        }
        let digits = now_ms.log10().floor() + 1.0;
        Weight::Fixed(-(now_ms / 10f64.powf(digits)))
    }

    pub fn value(&self) -> f64 {
        match self {
            Weight::Fixed(w) => *w,
            Weight::Dynamic(f) => f(),
        }
    }
}

impl fmt::Debug for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weight::Fixed(w) => f.debug_tuple("Fixed").field(w).finish(),
            Weight::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

// ── Leadership ───────────────────────────────────────────────────────

/// Election policy selected at construction.
#[derive(Debug, Default)]
pub enum Leadership {
    /// Weighted election (default).
    #[default]
    Basic,
    /// No automatic promotion or demotion.
    Disabled,
    Custom(Box<dyn LeadershipElection>),
}

impl Leadership {
    pub(crate) fn into_policy(self) -> Box<dyn LeadershipElection> {
        match self {
            Leadership::Basic => Box::new(BasicLeadershipElection),
            Leadership::Disabled => Box::new(NoLeadershipElection),
            Leadership::Custom(policy) => policy,
        }
    }
}

// ── Timing ───────────────────────────────────────────────────────────

/// Validated timer and election settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    pub hello_interval: Duration,
    pub check_interval: Duration,
    pub node_timeout: Duration,
    pub master_timeout: Duration,
    pub masters_required: usize,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            hello_interval: Duration::from_millis(1000),
            check_interval: Duration::from_millis(2000),
            node_timeout: Duration::from_millis(2000),
            master_timeout: Duration::from_millis(2000),
            masters_required: 1,
        }
    }
}

impl Timing {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hello_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("hello_interval"));
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::ZeroInterval("check_interval"));
        }
        if self.node_timeout < self.check_interval {
            return Err(ConfigError::NodeTimeoutBelowCheckInterval {
                node_timeout: self.node_timeout,
                check_interval: self.check_interval,
            });
        }
        if self.master_timeout < self.node_timeout {
            return Err(ConfigError::MasterTimeoutBelowNodeTimeout {
                master_timeout: self.master_timeout,
                node_timeout: self.node_timeout,
            });
        }
        if self.masters_required == 0 {
            return Err(ConfigError::ZeroMastersRequired);
        }
        Ok(())
    }
}

// ── DiscoverConfig ───────────────────────────────────────────────────

/// Configuration for a [`Discover`](crate::Discover) instance.
///
/// ```rust
/// use beacon_protocol::{DiscoverConfig, TransportConfig};
/// use std::time::Duration;
///
/// let config = DiscoverConfig::new()
///     .hello_interval(Duration::from_millis(500))
///     .masters_required(2)
///     .weight(7.0)
///     .transport(TransportConfig::new().port(4000).key("cluster-secret"));
/// ```
#[derive(Debug)]
pub struct DiscoverConfig {
    pub(crate) timing: Timing,
    pub(crate) weight: Option<Weight>,
    pub(crate) client: Option<bool>,
    pub(crate) server: Option<bool>,
    pub(crate) master_eligible: Option<bool>,
    pub(crate) advertisement: Option<Value>,
    pub(crate) leadership: Leadership,
    pub(crate) auto_start: bool,
    pub(crate) event_capacity: usize,
    pub(crate) transport: TransportConfig,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoverConfig {
    pub fn new() -> Self {
        Self {
            timing: Timing::default(),
            weight: None,
            client: None,
            server: None,
            master_eligible: None,
            advertisement: None,
            leadership: Leadership::Basic,
            auto_start: true,
            event_capacity: 256,
            transport: TransportConfig::new(),
        }
    }

    /// Announcement period (default: 1s).
    pub fn hello_interval(mut self, interval: Duration) -> Self {
        self.timing.hello_interval = interval;
        self
    }

    /// Sweep period (default: 2s).
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.timing.check_interval = interval;
        self
    }

    /// Liveness budget for non-master peers (default: 2s).
    pub fn node_timeout(mut self, timeout: Duration) -> Self {
        self.timing.node_timeout = timeout;
        self
    }

    /// Liveness budget for master peers (default: 2s).
    pub fn master_timeout(mut self, timeout: Duration) -> Self {
        self.timing.master_timeout = timeout;
        self
    }

    pub fn masters_required(mut self, count: usize) -> Self {
        self.timing.masters_required = count;
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(Weight::Fixed(weight));
        self
    }

    /// Compute the weight before every announcement.
    pub fn dynamic_weight(mut self, f: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.weight = Some(Weight::dynamic(f));
        self
    }

    /// Client role. Announcements are always tracked; setting only
    /// `client(true)` makes an observer that neither announces nor is
    /// eligible.
    pub fn client(mut self, enabled: bool) -> Self {
        self.client = Some(enabled);
        self
    }

    /// Announce this instance.
    pub fn server(mut self, enabled: bool) -> Self {
        self.server = Some(enabled);
        self
    }

    /// Initial eligibility (default: same as `server`).
    pub fn master_eligible(mut self, eligible: bool) -> Self {
        self.master_eligible = Some(eligible);
        self
    }

    pub fn advertisement(mut self, advertisement: Value) -> Self {
        self.advertisement = Some(advertisement);
        self
    }

    pub fn leadership(mut self, leadership: Leadership) -> Self {
        self.leadership = leadership;
        self
    }

    /// Start on [`Discover::launch`](crate::Discover::launch) (default: true).
    pub fn auto_start(mut self, enabled: bool) -> Self {
        self.auto_start = enabled;
        self
    }

    /// Lifecycle events buffered per subscriber (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// `(client, server)`: both default to true when neither is set;
    /// setting only one leaves the other false.
    pub fn roles(&self) -> (bool, bool) {
        match (self.client, self.server) {
            (None, None) => (true, true),
            (client, server) => (client.unwrap_or(false), server.unwrap_or(false)),
        }
    }

    /// Validate and split into the parts an instance is built from.
    pub(crate) fn resolve(self) -> Result<Resolved, ConfigError> {
        self.timing.validate()?;

        let (_, server) = self.roles();
        let weight = self.weight.unwrap_or_else(Weight::startup);
        let me = LocalIdentity {
            is_master: false,
            is_master_eligible: self.master_eligible.unwrap_or(server),
            weight: weight.value(),
            address: self.transport.bind_addr().ip().to_string(),
            advertisement: self.advertisement,
        };

        Ok(Resolved {
            timing: self.timing,
            server,
            me,
            weight,
            policy: self.leadership.into_policy(),
            auto_start: self.auto_start,
            event_capacity: self.event_capacity.max(1),
            transport: self.transport,
        })
    }
}

/// A validated configuration.
pub(crate) struct Resolved {
    pub timing: Timing,
    pub server: bool,
    pub me: LocalIdentity,
    pub weight: Weight,
    pub policy: Box<dyn LeadershipElection>,
    pub auto_start: bool,
    pub event_capacity: usize,
    pub transport: TransportConfig,
}

//! Scheduler configuration.
//!
//! All values are fixed when the rule is initialized; nothing here is
//! hot-reloadable. Every node of a network must run the same configuration,
//! otherwise neighbors derive different cells.

use std::str::FromStr;

use crate::{
    AllocationStrategy, Error, Result, DEFAULT_NUM_CHANNELS, DEFAULT_NUM_SUB_PERIOD,
    DEFAULT_SUB_PERIOD, DEFAULT_UNICAST_PERIOD, RESERVED_CHANNEL_OFFSETS,
};

/// How the scheduling epoch follows the host's slotframe counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EpochMode {
    /// Every node schedules for epoch 0; ticks are ignored.
    ///
    /// With a pinned epoch the replica term of the replicated strategy
    /// vanishes, so every replica merges into the base cell.
    Fixed,
    /// The host's slotframe counter at init is the first epoch. Every
    /// slotframe start advances it and re-derives all cells.
    #[default]
    Rotating,
}

impl FromStr for EpochMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "rotating" | "rotate" => Ok(Self::Rotating),
            other => Err(Error::InvalidConfig(format!("unknown epoch mode '{other}'"))),
        }
    }
}

/// Slotframe dimensions shared by every strategy function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Geometry {
    /// Unicast slotframe length in timeslots
    pub period: u16,
    /// Usable channel offsets (hopping sequence length minus the reserved one)
    pub channel_offsets: u16,
    /// Width of one sub-period in timeslots
    pub sub_period: u16,
    /// Number of sub-periods split into evenly distributed blocks
    pub num_sub_period: u16,
}

impl Geometry {
    /// Number of distinct cells in the slotframe.
    pub const fn capacity(&self) -> u32 {
        self.period as u32 * self.channel_offsets as u32
    }
}

/// Configuration for the unicast scheduling rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScheduleConfig {
    /// Unicast slotframe length in timeslots.
    pub unicast_period: u16,

    /// Length of the TSCH hopping sequence. Offset 0 is reserved, so
    /// `num_channels - 1` offsets are used for unicast cells.
    pub num_channels: u16,

    /// Width of one sub-period (evenly strategy).
    pub sub_period: u16,

    /// Number of sub-periods (evenly strategy).
    pub num_sub_period: u16,

    /// Cell allocation strategy.
    pub strategy: AllocationStrategy,

    /// Whether the epoch rotates with the host's slotframe counter.
    pub epoch_mode: EpochMode,

    /// Upper bound on additional cells per link for the scaled strategies.
    /// `None` lets fan-out decide, bounded only by slotframe capacity.
    pub max_additional_cells: Option<u16>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            unicast_period: DEFAULT_UNICAST_PERIOD,
            num_channels: DEFAULT_NUM_CHANNELS,
            sub_period: DEFAULT_SUB_PERIOD,
            num_sub_period: DEFAULT_NUM_SUB_PERIOD,
            strategy: AllocationStrategy::Single,
            epoch_mode: EpochMode::Rotating,
            max_additional_cells: None,
        }
    }
}

impl ScheduleConfig {
    /// Single-cell schedule over `period` timeslots.
    #[must_use]
    pub fn single(period: u16) -> Self {
        Self {
            unicast_period: period,
            ..Default::default()
        }
    }

    /// Replicated cells over `period` timeslots.
    #[must_use]
    pub fn replicated(period: u16) -> Self {
        Self {
            unicast_period: period,
            strategy: AllocationStrategy::Replicated,
            ..Default::default()
        }
    }

    /// Evenly distributed blocks; the period is `sub_period × num_sub_period`.
    #[must_use]
    pub fn evenly(sub_period: u16, num_sub_period: u16) -> Self {
        Self {
            unicast_period: sub_period.saturating_mul(num_sub_period),
            sub_period,
            num_sub_period,
            strategy: AllocationStrategy::Evenly,
            ..Default::default()
        }
    }

    /// Create config from `ATRIA_*` environment variables over the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_parse::<u16>("ATRIA_UNICAST_PERIOD")? {
            config.unicast_period = v;
        }
        if let Some(v) = env_parse::<u16>("ATRIA_NUM_CHANNELS")? {
            config.num_channels = v;
        }
        if let Some(v) = env_parse::<u16>("ATRIA_SUB_PERIOD")? {
            config.sub_period = v;
        }
        if let Some(v) = env_parse::<u16>("ATRIA_NUM_SUB_PERIOD")? {
            config.num_sub_period = v;
        }
        if let Ok(v) = std::env::var("ATRIA_STRATEGY") {
            config.strategy = v.parse()?;
        }
        if let Ok(v) = std::env::var("ATRIA_EPOCH_MODE") {
            config.epoch_mode = v.parse()?;
        }
        if let Some(v) = env_parse::<u16>("ATRIA_MAX_ADDITIONAL_CELLS")? {
            config.max_additional_cells = Some(v);
        }
        config.validate()?;
        Ok(config)
    }

    /// Set the allocation strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: AllocationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the hopping sequence length.
    #[must_use]
    pub fn with_channels(mut self, num_channels: u16) -> Self {
        self.num_channels = num_channels;
        self
    }

    /// Set the epoch mode.
    #[must_use]
    pub fn with_epoch_mode(mut self, mode: EpochMode) -> Self {
        self.epoch_mode = mode;
        self
    }

    /// Rotate cells every slotframe.
    #[must_use]
    pub fn rotating(self) -> Self {
        self.with_epoch_mode(EpochMode::Rotating)
    }

    /// Bound the additional cells per link.
    #[must_use]
    pub fn with_max_additional_cells(mut self, max: u16) -> Self {
        self.max_additional_cells = Some(max);
        self
    }

    /// Slotframe dimensions for the strategy functions.
    pub fn geometry(&self) -> Geometry {
        Geometry {
            period: self.unicast_period,
            channel_offsets: self.num_channels.saturating_sub(RESERVED_CHANNEL_OFFSETS),
            sub_period: self.sub_period,
            num_sub_period: self.num_sub_period,
        }
    }

    /// Check that the configuration describes a usable slotframe.
    pub fn validate(&self) -> Result<()> {
        if self.unicast_period == 0 {
            return Err(Error::InvalidConfig("unicast period must be non-zero".into()));
        }
        if self.unicast_period == u16::MAX {
            return Err(Error::InvalidConfig(format!(
                "unicast period must be below {}",
                u16::MAX
            )));
        }
        if self.num_channels <= RESERVED_CHANNEL_OFFSETS {
            return Err(Error::InvalidConfig(format!(
                "need at least {} hopping channels, got {}",
                RESERVED_CHANNEL_OFFSETS + 1,
                self.num_channels
            )));
        }
        if self.strategy == AllocationStrategy::Evenly {
            if self.sub_period == 0 || self.num_sub_period == 0 {
                return Err(Error::InvalidConfig(
                    "evenly strategy needs a non-zero sub-period and sub-period count".into(),
                ));
            }
            let span = self.sub_period as u32 * self.num_sub_period as u32;
            if span > self.unicast_period as u32 {
                return Err(Error::InvalidConfig(format!(
                    "{} sub-periods of {} timeslots do not fit in a period of {}",
                    self.num_sub_period, self.sub_period, self.unicast_period
                )));
            }
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidConfig(format!("invalid {name}: '{raw}'"))),
        Err(_) => Ok(None),
    }
}

//! Configuration for the tag remapper.
//!
//! This module defines all configuration structures used to size and tune the
//! remapper. It provides:
//! 1. **Defaults:** Baseline namespace shape, park sizing, and simulation parameters.
//! 2. **Structures:** Hierarchical config for the tag table, park, dispatch, reorder, and simulator.
//! 3. **Validation:** Construction-time checks that reject shapes the engine cannot honour.
//!
//! Configuration is fixed at construction. It is supplied as JSON (see the CLI's
//! `--config` flag) or built with `Config::default()`.

use serde::{Deserialize, Serialize};

use crate::common::error::RemapError;
use crate::common::ids::TagLayout;

/// Default configuration constants.
mod defaults {
    /// Distinct original IDs that may be outstanding at once.
    pub const NUM_ROWS: usize = 8;

    /// In-flight transactions per original ID.
    pub const NUM_COLS: usize = 4;

    /// Tags held back from allocation.
    pub const HEADROOM: usize = 0;

    /// Parallel dispatch channels.
    pub const CHANNELS: usize = 1;

    /// Per-ID output queue depth of the shared remapper.
    pub const ID_QUEUE_DEPTH: usize = 16;

    /// Simulator seed.
    pub const SEED: u64 = 0x5EED_1234_ABCD_0001;

    /// Transactions issued by a simulation run.
    pub const TRANSACTIONS: u64 = 10_000;

    /// Distinct original IDs used by the simulated originator.
    pub const IDS: u32 = 12;

    /// Maximum beats per simulated transaction.
    pub const MAX_BEATS: u32 = 4;

    /// Turn limit for a simulation run.
    pub const MAX_TURNS: u64 = 2_000_000;
}

/// How many releases the reorder unit performs per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ReleasePolicy {
    /// At most one release per step (direct hit first, else one park hit).
    #[default]
    Single,
    /// Release the direct hit, then every park hit that becomes eligible.
    Drain,
}

/// Root configuration.
///
/// # Examples
///
/// ```
/// use tagremap_core::config::{Config, ReleasePolicy};
///
/// let json = r#"{
///     "table": { "num_rows": 2, "num_cols": 8 },
///     "park": { "capacity": 8 },
///     "reorder": { "release": "Drain" }
/// }"#;
///
/// let config: Config = serde_json::from_str(json).unwrap();
/// assert_eq!(config.table.num_cols, 8);
/// assert_eq!(config.park_capacity(), 8);
/// assert_eq!(config.reorder.release, ReleasePolicy::Drain);
/// assert_eq!(config.dispatch.channels, 1);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Tag namespace shape.
    #[serde(default)]
    pub table: TableConfig,
    /// Early-completion buffer sizing.
    #[serde(default)]
    pub park: ParkConfig,
    /// Admission channels.
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// Release behaviour.
    #[serde(default)]
    pub reorder: ReorderConfig,
    /// Simulation harness parameters.
    #[serde(default)]
    pub sim: SimConfig,
}

impl Config {
    /// Builds a configuration for a `rows × cols` namespace with other fields defaulted.
    pub fn with_shape(num_rows: usize, num_cols: usize) -> Self {
        Self {
            table: TableConfig {
                num_rows,
                num_cols,
                headroom: defaults::HEADROOM,
            },
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration. Missing sections and fields
    /// take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text is not valid JSON for this schema or
    /// the result does not validate.
    pub fn from_json(text: &str) -> Result<Self, RemapError> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| RemapError::InvalidConfig(format!("config parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON configuration from `path`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read, or as for
    /// [`Config::from_json`].
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, RemapError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            RemapError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Returns the tag layout described by the table section.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the shape cannot be encoded.
    pub fn layout(&self) -> Result<TagLayout, RemapError> {
        TagLayout::new(self.table.num_rows, self.table.num_cols)
    }

    /// Effective park capacity.
    ///
    /// Defaults to one slot below the namespace size: at least one row head
    /// is always releasable directly, so at most `slots - 1` completions can
    /// ever need parking at once.
    pub fn park_capacity(&self) -> usize {
        self.park
            .capacity
            .unwrap_or_else(|| (self.table.num_rows * self.table.num_cols).saturating_sub(1).max(1))
    }

    /// Checks the configuration for shapes the engine cannot honour.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<(), RemapError> {
        let layout = self.layout()?;
        if self.table.headroom >= layout.slots() {
            return Err(RemapError::InvalidConfig(format!(
                "headroom {} leaves no allocatable tags out of {}",
                self.table.headroom,
                layout.slots()
            )));
        }
        let park = self.park_capacity();
        if park == 0 || park > layout.slots() {
            return Err(RemapError::InvalidConfig(format!(
                "park capacity {park} must be within 1..={}",
                layout.slots()
            )));
        }
        if self.dispatch.channels == 0 {
            return Err(RemapError::InvalidConfig(
                "at least one dispatch channel is required".into(),
            ));
        }
        if self.reorder.id_queue_depth == 0 {
            return Err(RemapError::InvalidConfig(
                "id_queue_depth must be non-zero".into(),
            ));
        }
        if self.sim.max_beats == 0 || self.sim.ids == 0 {
            return Err(RemapError::InvalidConfig(
                "simulation needs at least one ID and one beat per transaction".into(),
            ));
        }
        Ok(())
    }
}

/// Tag namespace shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableConfig {
    /// Rows: maximum number of concurrently distinct original IDs.
    #[serde(default = "TableConfig::default_num_rows")]
    pub num_rows: usize,
    /// Columns: maximum in-flight transactions per original ID.
    #[serde(default = "TableConfig::default_num_cols")]
    pub num_cols: usize,
    /// Tags never handed out, reducing the allocatable total below `rows × cols`.
    #[serde(default)]
    pub headroom: usize,
}

impl TableConfig {
    fn default_num_rows() -> usize {
        defaults::NUM_ROWS
    }

    fn default_num_cols() -> usize {
        defaults::NUM_COLS
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            num_rows: defaults::NUM_ROWS,
            num_cols: defaults::NUM_COLS,
            headroom: defaults::HEADROOM,
        }
    }
}

/// Park sizing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParkConfig {
    /// Beats the park may hold at once; `None` selects `rows × cols - 1`.
    #[serde(default)]
    pub capacity: Option<usize>,
}

/// Admission channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Replicated dispatch units, each holding one request at a time.
    #[serde(default = "DispatchConfig::default_channels")]
    pub channels: usize,
}

impl DispatchConfig {
    fn default_channels() -> usize {
        defaults::CHANNELS
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channels: defaults::CHANNELS,
        }
    }
}

/// Release behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderConfig {
    /// Releases per engine step.
    #[serde(default)]
    pub release: ReleasePolicy,
    /// Depth of each per-ID output queue in the shared remapper.
    #[serde(default = "ReorderConfig::default_id_queue_depth")]
    pub id_queue_depth: usize,
}

impl ReorderConfig {
    fn default_id_queue_depth() -> usize {
        defaults::ID_QUEUE_DEPTH
    }
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            release: ReleasePolicy::default(),
            id_queue_depth: defaults::ID_QUEUE_DEPTH,
        }
    }
}

/// Simulation harness parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Seed for the workload and fabric generators.
    #[serde(default = "SimConfig::default_seed")]
    pub seed: u64,
    /// Transactions to issue.
    #[serde(default = "SimConfig::default_transactions")]
    pub transactions: u64,
    /// Distinct original IDs the originator draws from.
    #[serde(default = "SimConfig::default_ids")]
    pub ids: u32,
    /// Maximum beats per transaction (each transaction uses `1..=max_beats`).
    #[serde(default = "SimConfig::default_max_beats")]
    pub max_beats: u32,
    /// Turn limit before the run is declared stuck.
    #[serde(default = "SimConfig::default_max_turns")]
    pub max_turns: u64,
}

impl SimConfig {
    fn default_seed() -> u64 {
        defaults::SEED
    }

    fn default_transactions() -> u64 {
        defaults::TRANSACTIONS
    }

    fn default_ids() -> u32 {
        defaults::IDS
    }

    fn default_max_beats() -> u32 {
        defaults::MAX_BEATS
    }

    fn default_max_turns() -> u64 {
        defaults::MAX_TURNS
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: defaults::SEED,
            transactions: defaults::TRANSACTIONS,
            ids: defaults::IDS,
            max_beats: defaults::MAX_BEATS,
            max_turns: defaults::MAX_TURNS,
        }
    }
}

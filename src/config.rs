//! Configuration system for the fetch frontend.
//!
//! This module defines all configuration structures and enums used to
//! parameterize the frontend. It provides:
//! 1. **Defaults:** baseline hardware constants (widths, queue depths,
//!    predictor table sizes, backward-wire delays).
//! 2. **Structures:** hierarchical config for fetch, branch prediction, and
//!    inter-stage delays.
//! 3. **Enums:** SMT fetch policy and direction-predictor selection.
//!
//! Configuration is supplied as JSON (the embedding simulator's exchange
//! format) or via `FrontendConfig::default()`.

use serde::Deserialize;

use crate::common::{ConfigError, MAX_THREADS};
use crate::core::frontend::policy::SmtFetchPolicy;

/// Default configuration constants for the frontend.
mod defaults {
    /// Instructions fetched per cycle.
    pub const FETCH_WIDTH: usize = 4;

    /// Instructions handed to decode per cycle.
    pub const DECODE_WIDTH: usize = 4;

    /// Fetch buffer size in bytes.
    ///
    /// The buffer may be smaller than a cache line; fetch addresses are
    /// aligned to this granule.
    pub const FETCH_BUFFER_SIZE: usize = 64;

    /// Per-thread fetch queue depth in micro-ops.
    pub const FETCH_QUEUE_SIZE: usize = 32;

    /// Fetch target queue depth in basic blocks.
    pub const FTQ_SIZE: usize = 8;

    /// Number of hardware threads.
    pub const NUM_THREADS: usize = 1;

    /// Default Branch Target Buffer size (4096 entries).
    pub const BTB_ENTRIES: usize = 4096;

    /// Bits of tag stored per BTB entry.
    pub const BTB_TAG_BITS: usize = 16;

    /// Number of low PC bits ignored by predictor indexing.
    pub const INST_SHIFT: usize = 2;

    /// Default Return Address Stack depth (16 entries).
    pub const RAS_SIZE: usize = 16;

    /// Indirect target table size (256 entries).
    pub const INDIRECT_ENTRIES: usize = 256;

    /// Direction predictor table size (log2, 4096 entries).
    pub const DIR_TABLE_BITS: usize = 12;

    /// Decode to fetch signal delay in cycles.
    pub const DECODE_TO_FETCH_DELAY: u64 = 1;

    /// Rename to fetch signal delay in cycles.
    pub const RENAME_TO_FETCH_DELAY: u64 = 1;

    /// IEW to fetch signal delay in cycles.
    pub const IEW_TO_FETCH_DELAY: u64 = 1;

    /// Commit to fetch signal delay in cycles.
    pub const COMMIT_TO_FETCH_DELAY: u64 = 1;
}

/// Direction-predictor algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum DirectionKind {
    /// Global-history predictor hashing the PC with a speculative GHR.
    #[default]
    GShare,
    /// Per-PC 2-bit saturating counters, no global history.
    Bimodal,
}

/// Root configuration structure for the frontend.
///
/// # Examples
///
/// Deserializing from JSON:
///
/// ```
/// use frontsim::config::FrontendConfig;
///
/// let json = r#"{
///     "fetch": {
///         "fetch_width": 2,
///         "ftq_size": 4,
///         "num_threads": 2,
///         "policy": "RoundRobin"
///     },
///     "bpu": {
///         "btb_entries": 1024,
///         "ras_size": 8,
///         "fallback_btb": true,
///         "direction": "Bimodal"
///     }
/// }"#;
///
/// let config: FrontendConfig = serde_json::from_str(json).unwrap();
/// assert_eq!(config.fetch.fetch_width, 2);
/// assert_eq!(config.bpu.btb_entries, 1024);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrontendConfig {
    /// Fetch engine and queue parameters.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Branch prediction unit parameters.
    #[serde(default)]
    pub bpu: BpuConfig,
    /// Backward-wire delays from downstream stages.
    #[serde(default)]
    pub delays: DelayConfig,
}

impl FrontendConfig {
    /// Checks every parameter that must describe real hardware.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for non-power-of-two table or buffer sizes,
    /// zero widths, or a thread count above `MAX_THREADS`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.fetch_width == 0 {
            return Err(ConfigError::ZeroParam("fetch_width"));
        }
        if self.fetch.decode_width == 0 {
            return Err(ConfigError::ZeroParam("decode_width"));
        }
        if self.fetch.ftq_size == 0 {
            return Err(ConfigError::ZeroParam("ftq_size"));
        }
        if self.fetch.fetch_queue_size == 0 {
            return Err(ConfigError::ZeroParam("fetch_queue_size"));
        }
        if self.fetch.num_threads == 0 {
            return Err(ConfigError::ZeroParam("num_threads"));
        }
        if self.fetch.max_bb_insts == 0 {
            return Err(ConfigError::ZeroParam("max_bb_insts"));
        }
        if self.fetch.num_threads > MAX_THREADS {
            return Err(ConfigError::TooManyThreads(self.fetch.num_threads));
        }
        if !self.fetch.fetch_buffer_size.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo(
                "fetch_buffer_size",
                self.fetch.fetch_buffer_size,
            ));
        }
        if !self.bpu.btb_entries.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo("btb_entries", self.bpu.btb_entries));
        }
        if !self.bpu.indirect_entries.is_power_of_two() {
            return Err(ConfigError::NotPowerOfTwo(
                "indirect_entries",
                self.bpu.indirect_entries,
            ));
        }
        if self.bpu.ras_size == 0 {
            return Err(ConfigError::ZeroParam("ras_size"));
        }
        Ok(())
    }
}

/// Fetch engine and queue configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Instructions fetched per cycle.
    #[serde(default = "FetchConfig::default_fetch_width")]
    pub fetch_width: usize,

    /// Instructions handed to decode per cycle.
    #[serde(default = "FetchConfig::default_decode_width")]
    pub decode_width: usize,

    /// Fetch buffer size in bytes. Must be a power of two.
    #[serde(default = "FetchConfig::default_fetch_buffer_size")]
    pub fetch_buffer_size: usize,

    /// Per-thread fetch queue depth in micro-ops.
    #[serde(default = "FetchConfig::default_fetch_queue_size")]
    pub fetch_queue_size: usize,

    /// Fetch target queue depth in basic blocks.
    #[serde(default = "FetchConfig::default_ftq_size")]
    pub ftq_size: usize,

    /// Number of hardware threads.
    #[serde(default = "FetchConfig::default_num_threads")]
    pub num_threads: usize,

    /// SMT fetch policy.
    #[serde(default)]
    pub policy: SmtFetchPolicy,

    /// Maximum basic block length in instructions.
    ///
    /// Blocks reaching this length without a predicted branch are sealed as
    /// fall-through blocks. Defaults to one fetch buffer of instructions.
    #[serde(default = "FetchConfig::default_max_bb_insts")]
    pub max_bb_insts: u64,
}

impl FetchConfig {
    fn default_fetch_width() -> usize {
        defaults::FETCH_WIDTH
    }

    fn default_decode_width() -> usize {
        defaults::DECODE_WIDTH
    }

    fn default_fetch_buffer_size() -> usize {
        defaults::FETCH_BUFFER_SIZE
    }

    fn default_fetch_queue_size() -> usize {
        defaults::FETCH_QUEUE_SIZE
    }

    fn default_ftq_size() -> usize {
        defaults::FTQ_SIZE
    }

    fn default_num_threads() -> usize {
        defaults::NUM_THREADS
    }

    fn default_max_bb_insts() -> u64 {
        (defaults::FETCH_BUFFER_SIZE as u64) / crate::common::INST_BYTES
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fetch_width: defaults::FETCH_WIDTH,
            decode_width: defaults::DECODE_WIDTH,
            fetch_buffer_size: defaults::FETCH_BUFFER_SIZE,
            fetch_queue_size: defaults::FETCH_QUEUE_SIZE,
            ftq_size: defaults::FTQ_SIZE,
            num_threads: defaults::NUM_THREADS,
            policy: SmtFetchPolicy::default(),
            max_bb_insts: Self::default_max_bb_insts(),
        }
    }
}

/// Branch prediction unit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BpuConfig {
    /// Branch Target Buffer entries. Must be a power of two.
    #[serde(default = "BpuConfig::default_btb_entries")]
    pub btb_entries: usize,

    /// Bits of tag stored per BTB entry.
    #[serde(default = "BpuConfig::default_btb_tag_bits")]
    pub btb_tag_bits: usize,

    /// Low PC bits ignored by predictor indexing.
    #[serde(default = "BpuConfig::default_inst_shift")]
    pub inst_shift: usize,

    /// Return Address Stack depth per thread.
    #[serde(default = "BpuConfig::default_ras_size")]
    pub ras_size: usize,

    /// Indirect target table entries. Must be a power of two.
    #[serde(default = "BpuConfig::default_indirect_entries")]
    pub indirect_entries: usize,

    /// Direction predictor table size (log2 of entries).
    #[serde(default = "BpuConfig::default_dir_table_bits")]
    pub dir_table_bits: usize,

    /// Fall back to the BTB target when the RAS or indirect predictor
    /// cannot provide one. When false, such branches are forced not-taken.
    #[serde(default = "BpuConfig::default_fallback_btb")]
    pub fallback_btb: bool,

    /// Direction predictor algorithm.
    #[serde(default)]
    pub direction: DirectionKind,
}

impl BpuConfig {
    fn default_btb_entries() -> usize {
        defaults::BTB_ENTRIES
    }

    fn default_btb_tag_bits() -> usize {
        defaults::BTB_TAG_BITS
    }

    fn default_inst_shift() -> usize {
        defaults::INST_SHIFT
    }

    fn default_ras_size() -> usize {
        defaults::RAS_SIZE
    }

    fn default_indirect_entries() -> usize {
        defaults::INDIRECT_ENTRIES
    }

    fn default_dir_table_bits() -> usize {
        defaults::DIR_TABLE_BITS
    }

    fn default_fallback_btb() -> bool {
        true
    }
}

impl Default for BpuConfig {
    fn default() -> Self {
        Self {
            btb_entries: defaults::BTB_ENTRIES,
            btb_tag_bits: defaults::BTB_TAG_BITS,
            inst_shift: defaults::INST_SHIFT,
            ras_size: defaults::RAS_SIZE,
            indirect_entries: defaults::INDIRECT_ENTRIES,
            dir_table_bits: defaults::DIR_TABLE_BITS,
            fallback_btb: true,
            direction: DirectionKind::default(),
        }
    }
}

/// Backward-wire delays from downstream stages, in cycles.
#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    /// Decode to fetch delay.
    #[serde(default = "DelayConfig::default_decode")]
    pub decode_to_fetch: u64,

    /// Rename to fetch delay.
    #[serde(default = "DelayConfig::default_rename")]
    pub rename_to_fetch: u64,

    /// IEW to fetch delay.
    #[serde(default = "DelayConfig::default_iew")]
    pub iew_to_fetch: u64,

    /// Commit to fetch delay.
    #[serde(default = "DelayConfig::default_commit")]
    pub commit_to_fetch: u64,
}

impl DelayConfig {
    fn default_decode() -> u64 {
        defaults::DECODE_TO_FETCH_DELAY
    }

    fn default_rename() -> u64 {
        defaults::RENAME_TO_FETCH_DELAY
    }

    fn default_iew() -> u64 {
        defaults::IEW_TO_FETCH_DELAY
    }

    fn default_commit() -> u64 {
        defaults::COMMIT_TO_FETCH_DELAY
    }

    /// The deepest backward delay; sizes the shared time buffer.
    pub fn max_backward(&self) -> u64 {
        self.decode_to_fetch
            .max(self.rename_to_fetch)
            .max(self.iew_to_fetch)
            .max(self.commit_to_fetch)
    }
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            decode_to_fetch: defaults::DECODE_TO_FETCH_DELAY,
            rename_to_fetch: defaults::RENAME_TO_FETCH_DELAY,
            iew_to_fetch: defaults::IEW_TO_FETCH_DELAY,
            commit_to_fetch: defaults::COMMIT_TO_FETCH_DELAY,
        }
    }
}

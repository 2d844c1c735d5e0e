use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::situation::ChoiceCategory;

/// Main configuration structure for Reforge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Expansion budgets and limits
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Pending-choice priority weights
    #[serde(default)]
    pub priority: PriorityConfig,

    /// Retry policy configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Beneficial cycle injection
    #[serde(default)]
    pub cycles: CycleConfig,

    /// Snapshot persistence
    #[serde(default)]
    pub snapshots: SnapshotConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the content graph treats an inserted situation whose id is taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateIdPolicy {
    /// Rename to `id_2`, `id_3`, ...
    #[default]
    Suffix,
    /// Fail with `DuplicateId`.
    Reject,
}

/// Expansion budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GenerationConfig {
    /// Stop expanding once the graph holds this many situations
    #[serde(default = "default_target_situations")]
    pub target_situations: usize,

    /// Situations at this depth are never expanded
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Hard cap on expansion loop iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Optional wall-clock budget for the expansion phase
    #[serde(default)]
    pub max_duration_secs: Option<u64>,

    /// Pause between expansion steps
    #[serde(default)]
    pub step_delay_ms: u64,

    /// Independent generation requests issued at once
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Upper bound on repair passes during finalization
    #[serde(default = "default_max_finalize_passes")]
    pub max_finalize_passes: u32,

    #[serde(default)]
    pub duplicate_id_policy: DuplicateIdPolicy,
}

const fn default_target_situations() -> usize {
    50
}

const fn default_max_depth() -> u32 {
    3
}

const fn default_max_iterations() -> u32 {
    100
}

const fn default_max_concurrent_requests() -> usize {
    1
}

const fn default_max_finalize_passes() -> u32 {
    5
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            target_situations: default_target_situations(),
            max_depth: default_max_depth(),
            max_iterations: default_max_iterations(),
            max_duration_secs: None,
            step_delay_ms: 0,
            max_concurrent_requests: default_max_concurrent_requests(),
            max_finalize_passes: default_max_finalize_passes(),
            duplicate_id_policy: DuplicateIdPolicy::default(),
        }
    }
}

/// Weights of the pending-choice priority formula
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PriorityConfig {
    /// Subtracted once per level of depth
    #[serde(default = "default_depth_penalty")]
    pub depth_penalty: f64,

    /// Subtracted once per unmet stat requirement
    #[serde(default = "default_requirement_penalty")]
    pub requirement_penalty: f64,

    /// Added once per parent tag found in an active narrative thread
    #[serde(default = "default_thread_urgency_bonus")]
    pub thread_urgency_bonus: f64,

    /// Base weight by category name; missing categories weigh 1.0
    #[serde(default = "default_category_weights")]
    pub category_weights: IndexMap<String, f64>,
}

const fn default_depth_penalty() -> f64 {
    2.0
}

const fn default_requirement_penalty() -> f64 {
    0.5
}

const fn default_thread_urgency_bonus() -> f64 {
    1.0
}

fn default_category_weights() -> IndexMap<String, f64> {
    IndexMap::from([
        (ChoiceCategory::Dialogue.as_str().to_string(), 3.0),
        (ChoiceCategory::Action.as_str().to_string(), 2.0),
    ])
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            depth_penalty: default_depth_penalty(),
            requirement_penalty: default_requirement_penalty(),
            thread_urgency_bonus: default_thread_urgency_bonus(),
            category_weights: default_category_weights(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Total attempts per generation call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Beneficial cycle injection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CycleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum depth of the parent situation
    #[serde(default = "default_cycle_min_depth")]
    pub min_depth: u32,

    /// Situations that must exist before a cycle may be injected
    #[serde(default = "default_cycle_min_generated")]
    pub min_generated: usize,

    /// Chance that an eligible choice loops back
    #[serde(default = "default_cycle_probability")]
    pub probability: f64,

    #[serde(default = "default_cycle_categories")]
    pub allowed_categories: Vec<ChoiceCategory>,

    /// RNG seed; entropy when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

const fn default_true() -> bool {
    true
}

const fn default_cycle_min_depth() -> u32 {
    2
}

const fn default_cycle_min_generated() -> usize {
    5
}

const fn default_cycle_probability() -> f64 {
    0.1
}

fn default_cycle_categories() -> Vec<ChoiceCategory> {
    vec![
        ChoiceCategory::EmotionalResponse,
        ChoiceCategory::SocialInteraction,
        ChoiceCategory::Investigation,
    ]
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_depth: default_cycle_min_depth(),
            min_generated: default_cycle_min_generated(),
            probability: default_cycle_probability(),
            allowed_categories: default_cycle_categories(),
            seed: None,
        }
    }
}

/// Snapshot persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SnapshotConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root directory; each run gets its own subdirectory
    #[serde(default = "default_snapshot_directory")]
    pub directory: PathBuf,
}

fn default_snapshot_directory() -> PathBuf {
    PathBuf::from("saves")
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_snapshot_directory(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Stdout format: json or pretty
    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling JSON log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

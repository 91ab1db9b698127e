//! CLI argument definitions using clap derive API

use clap::{Args, Parser, Subcommand, ValueEnum};
use lf_core::SplitRatio;
use lf_engine::ClaimPolicy;
use std::path::PathBuf;

/// Labelforge - dataset versioning and training for image labeling projects
#[derive(Parser, Debug)]
#[command(name = "lf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all commands
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory holding labelforge.yml
    #[arg(short = 'p', long, global = true, default_value = ".")]
    pub project_dir: String,

    /// Override config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override database path
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create, inspect, revert, and export dataset snapshots
    Snapshot(SnapshotArgs),

    /// Assign and inspect train/dev/test splits
    Split(SplitArgs),

    /// Submit and manage training jobs
    Train(TrainArgs),

    /// Poll the training service for finished jobs
    Poll(PollArgs),

    /// Inspect and manage trained models
    Model(ModelArgs),

    /// Manage project classes
    Class(ClassArgs),
}

/// Caller identity stamped on every write
#[derive(Args, Debug, Clone)]
pub struct UserArg {
    /// User id recorded as creator/updater
    #[arg(short, long, env = "LF_USER", default_value = "cli")]
    pub user: String,
}

// ── snapshot ────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommand {
    /// Freeze the live dataset of a project
    Create {
        #[arg(long)]
        project: i64,
        /// Snapshot name, unique per project
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[command(flatten)]
        user: UserArg,
    },
    /// List snapshots of a project, newest first
    List {
        #[arg(long)]
        project: i64,
    },
    /// Show one snapshot
    Show { snapshot: i64 },
    /// Counts a snapshot would freeze right now
    Preview {
        #[arg(long)]
        project: i64,
    },
    /// List the images frozen in a snapshot
    Images { snapshot: i64 },
    /// Delete a snapshot and its frozen rows
    Delete {
        snapshot: i64,
        #[command(flatten)]
        user: UserArg,
    },
    /// Replace a project's live dataset with a snapshot
    Revert {
        snapshot: i64,
        #[arg(long)]
        project: i64,
        #[command(flatten)]
        user: UserArg,
    },
    /// Create a new project from a snapshot
    Fork {
        snapshot: i64,
        /// Name of the new project
        #[arg(long)]
        name: String,
        #[command(flatten)]
        user: UserArg,
    },
    /// Write the snapshot's training archive to a file
    Download {
        snapshot: i64,
        /// Output path of the .tar.gz archive
        #[arg(short, long)]
        output: PathBuf,
    },
}

// ── split ───────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct SplitArgs {
    #[command(subcommand)]
    pub command: SplitCommand,
}

/// Which class claims an image labeled with several classes
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPolicyArg {
    /// Lowest class id first
    FirstById,
    /// Classes with fewer images first
    Rarest,
}

impl From<ClaimPolicyArg> for ClaimPolicy {
    fn from(arg: ClaimPolicyArg) -> Self {
        match arg {
            ClaimPolicyArg::FirstById => ClaimPolicy::FirstClassById,
            ClaimPolicyArg::Rarest => ClaimPolicy::RarestClassFirst,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum SplitCommand {
    /// Per-class counts of images eligible for assignment
    Stats {
        #[arg(long)]
        project: i64,
        /// Count images that already have a split
        #[arg(long)]
        include_assigned: bool,
    },
    /// Assign splits per class
    Assign {
        #[arg(long)]
        project: i64,
        /// Ratio for every class, e.g. 70/20/10
        #[arg(long, value_parser = parse_ratio)]
        ratio: Option<SplitRatio>,
        /// Per-class ratio, e.g. 12=80/10/10 (repeatable)
        #[arg(long = "class-ratio", value_parser = parse_class_ratio)]
        class_ratios: Vec<(i64, SplitRatio)>,
        /// Also assign no-class and unlabeled images
        #[arg(long)]
        adjust_all_together: bool,
        /// Reassign images that already have a split
        #[arg(long)]
        include_assigned: bool,
        #[arg(long, value_enum, default_value = "first-by-id")]
        policy: ClaimPolicyArg,
        #[command(flatten)]
        user: UserArg,
    },
    /// Current split counts per class and per split
    Preview {
        #[arg(long)]
        project: i64,
    },
    /// Set the split of one image (training, dev, test, or empty)
    Set {
        image: i64,
        split: String,
        #[command(flatten)]
        user: UserArg,
    },
}

/// Parse `train/dev/test` percentages.
pub(crate) fn parse_ratio(value: &str) -> Result<SplitRatio, String> {
    let parts: Vec<&str> = value.split('/').map(str::trim).collect();
    let [train, dev, test] = parts.as_slice() else {
        return Err(format!("expected TRAIN/DEV/TEST, got '{value}'"));
    };
    let number = |s: &str| {
        s.parse::<u32>()
            .map_err(|_| format!("'{s}' is not a whole percentage"))
    };
    SplitRatio::new(number(train)?, number(dev)?, number(test)?).map_err(|e| e.to_string())
}

/// Parse `CLASS_ID=TRAIN/DEV/TEST`.
pub(crate) fn parse_class_ratio(value: &str) -> Result<(i64, SplitRatio), String> {
    let (class, ratio) = value
        .split_once('=')
        .ok_or_else(|| format!("expected CLASS_ID=TRAIN/DEV/TEST, got '{value}'"))?;
    let class_id = class
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("'{class}' is not a class id"))?;
    Ok((class_id, parse_ratio(ratio)?))
}

// ── train ───────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(subcommand)]
    pub command: TrainCommand,
}

#[derive(Subcommand, Debug)]
pub enum TrainCommand {
    /// Submit one training job per model configuration
    Start {
        #[arg(long)]
        project: i64,
        /// Train on a snapshot instead of the live dataset
        #[arg(long)]
        snapshot: Option<i64>,
        /// YAML or JSON list of model configurations
        #[arg(long, conflicts_with = "alias")]
        configs: Option<PathBuf>,
        /// Model alias (repeatable); each gets the same epochs and size
        #[arg(long)]
        alias: Vec<String>,
        #[arg(long, default_value_t = 100)]
        epochs: u32,
        #[arg(long, default_value = "s")]
        model_size: String,
        /// Raw JSON merged over the typed fields
        #[arg(long)]
        model_param: Option<String>,
        #[command(flatten)]
        user: UserArg,
    },
    /// Status and progress hints of a training record
    Status { id: i64 },
    /// Training records of a project, newest first
    List {
        #[arg(long)]
        project: i64,
    },
    /// Cancel a running training record
    Cancel {
        id: i64,
        #[command(flatten)]
        user: UserArg,
    },
}

// ── poll ────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct PollArgs {
    /// Run a single tick and exit
    #[arg(long)]
    pub once: bool,

    /// Override poller.interval_secs
    #[arg(long)]
    pub interval: Option<u64>,
}

// ── model ───────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ModelArgs {
    #[command(subcommand)]
    pub command: ModelCommand,
}

#[derive(Subcommand, Debug)]
pub enum ModelCommand {
    /// Models of a project
    List {
        #[arg(long)]
        project: i64,
        /// Include deleted models
        #[arg(long)]
        all: bool,
    },
    /// Model details, report, and charts
    Show { model: i64 },
    /// Confusion matrix at the model's confidence threshold
    Matrix { model: i64 },
    /// Create a new model version at another confidence threshold
    Threshold {
        model: i64,
        #[arg(long)]
        threshold: f64,
        #[arg(long)]
        training_rate: f64,
        #[arg(long)]
        dev_rate: f64,
        #[arg(long)]
        test_rate: f64,
        #[command(flatten)]
        user: UserArg,
    },
    /// Deactivate a model
    Delete {
        model: i64,
        #[command(flatten)]
        user: UserArg,
    },
}

// ── class ───────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ClassArgs {
    #[command(subcommand)]
    pub command: ClassCommand,
}

#[derive(Subcommand, Debug)]
pub enum ClassCommand {
    /// Delete a class no label or split setting refers to
    Delete {
        class: i64,
        #[command(flatten)]
        user: UserArg,
    },
}

#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

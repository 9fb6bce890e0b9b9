use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use consult_note::{AbsentSections, ExecutionMode};

#[derive(Parser, Debug)]
#[command(
    name = "consult-note",
    version,
    about = "Consolidate a multi-note clinical document dump into one summary note"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Build(BuildArgs),
    Segments(SegmentsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = AbsentMode::Omit)]
    pub absent: AbsentMode,

    #[arg(long, value_enum, default_value_t = ExecutionArg::Parallel)]
    pub execution: ExecutionArg,

    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SegmentsArgs {
    #[arg(long)]
    pub input: PathBuf,

    #[arg(long)]
    pub output: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum AbsentMode {
    Omit,
    Placeholder,
}

impl From<AbsentMode> for AbsentSections {
    fn from(value: AbsentMode) -> Self {
        match value {
            AbsentMode::Omit => AbsentSections::Omit,
            AbsentMode::Placeholder => AbsentSections::Placeholder,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExecutionArg {
    Parallel,
    Sequential,
}

impl From<ExecutionArg> for ExecutionMode {
    fn from(value: ExecutionArg) -> Self {
        match value {
            ExecutionArg::Parallel => ExecutionMode::Parallel,
            ExecutionArg::Sequential => ExecutionMode::Sequential,
        }
    }
}

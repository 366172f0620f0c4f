use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "postercat",
    version,
    about = "Poster catalog ingestion and validation tooling"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Import(ImportArgs),
    Validate(ValidateArgs),
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SourceKind {
    Pdf,
    Image,
    Csv,
    Json,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ImportMode {
    Merge,
    Replace,
}

impl ImportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Replace => "replace",
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Source directory (pdf/image) or file (csv/json).
    pub source_path: PathBuf,

    #[arg(long, value_enum, default_value_t = SourceKind::Pdf)]
    pub source: SourceKind,

    #[arg(long, value_enum, default_value_t = ImportMode::Merge)]
    pub mode: ImportMode,

    #[arg(long, default_value_t = 1)]
    pub start_id: u32,

    #[arg(long, default_value_t = false)]
    pub use_vision: bool,

    #[arg(long, default_value = "gemma3:latest")]
    pub vision_model: String,

    #[arg(long, default_value = "http://localhost:11434")]
    pub ollama_url: String,

    #[arg(long, default_value_t = 60)]
    pub vision_timeout_secs: u64,

    #[arg(long)]
    pub overrides: Option<PathBuf>,

    #[arg(long, default_value = "backend/posters.json")]
    pub catalog_path: PathBuf,

    #[arg(long, default_value = "backend/data/posters.json")]
    pub flat_path: PathBuf,

    #[arg(long, default_value = "client/assets/posters")]
    pub image_dir: PathBuf,

    #[arg(long, default_value_t = 150)]
    pub dpi: u32,

    /// Directory for per-run import manifests (default: <catalog dir>/manifests).
    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    /// Commit even when the validation report is non-empty.
    #[arg(long, default_value_t = false)]
    pub ignore_validation: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long, default_value = "backend/posters.json")]
    pub catalog_path: PathBuf,

    #[arg(long, default_value = "backend/data/posters.json")]
    pub flat_path: PathBuf,

    /// Base directory for resolving relative display_image_ref paths.
    #[arg(long, default_value = ".")]
    pub image_root: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "backend/posters.json")]
    pub catalog_path: PathBuf,

    #[arg(long, default_value = "backend/data/posters.json")]
    pub flat_path: PathBuf,

    #[arg(long, default_value = "client/assets/posters")]
    pub image_dir: PathBuf,
}

//! papiline cli interface

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt::Formatter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Change the work directory
    ///
    /// Can be specified multiple times. Note that all
    /// paths on the way to the final path must exist.
    ///
    /// This is equivalent to running { cd <directory>; papiline ... }
    #[clap(short = 'C', long = "directory", global(true))]
    pub directory: Vec<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decompose a rule tree into a template bundle
    Convert(ConvertCommand),

    /// Recombine a template bundle into a rule tree
    Merge(MergeCommand),

    /// Produce a signed Authorization header for a request
    ///
    /// Development utility: no request is sent, the header and the
    /// resolved url are printed instead.
    Sign(SignCommand),
}

#[derive(Parser, Debug)]
pub struct ConvertCommand {
    /// Rule tree JSON file
    #[clap(short = 'r', long = "rule-tree")]
    pub rule_tree: PathBuf,

    /// Converter rule set JSON file
    #[clap(short = 'c', long = "converter")]
    pub converter: PathBuf,

    /// Product ID selecting the converter rules
    #[clap(short = 'p', long = "product")]
    pub product: String,

    /// Variable extraction mode
    #[clap(short = 'm', long = "mode", default_value_t)]
    pub mode: Mode,

    /// Treat the tree as a new property blueprint
    #[clap(long = "new-property")]
    pub new_property: bool,

    /// Output directory for the bundle
    #[clap(short = 'o', long = "out")]
    pub out: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Default, Debug)]
pub enum Mode {
    #[default]
    Default,
    UserVarValue,
    NoVar,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Default => f.write_str("default"),
            Mode::UserVarValue => f.write_str("user-var-value"),
            Mode::NoVar => f.write_str("no-var"),
        }
    }
}

impl From<Mode> for papiline::template::VariableMode {
    fn from(mode: Mode) -> Self {
        use papiline::template::VariableMode;

        match mode {
            Mode::Default => VariableMode::Default,
            Mode::UserVarValue => VariableMode::UserVarValue,
            Mode::NoVar => VariableMode::NoVar,
        }
    }
}

#[derive(Parser, Debug)]
pub struct MergeCommand {
    /// Bundle directory (as written by `convert`)
    #[clap(short = 'd', long = "dir")]
    pub dir: PathBuf,

    /// Environment variable overrides, a plain JSON object
    #[clap(short = 'e', long = "env-file")]
    pub env_file: Option<PathBuf>,

    #[clap(flatten)]
    pub output: OutputArgs,
}

#[derive(Parser, Debug)]
pub struct OutputArgs {
    #[arg(short = 'F', long = "output-format", default_value_t)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Default, Debug)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Yaml => f.write_str("yaml"),
        }
    }
}

#[derive(Parser, Debug)]
pub struct SignCommand {
    /// Credentials JSON file ({client_token, client_secret, access_token, host})
    #[clap(short = 'k', long = "credentials")]
    pub credentials: PathBuf,

    /// HTTP method
    #[clap(short = 'X', long = "method", default_value = "GET")]
    pub method: String,

    /// Request path, e.g. /papi/v1/contracts
    #[clap(short = 'p', long = "path")]
    pub path: String,

    /// Request header as 'Name: value'
    #[clap(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Header name to fold into the signature, in order
    #[clap(short = 'S', long = "sign-header")]
    pub sign_headers: Vec<String>,

    /// JSON file used as the request body
    #[clap(short = 'b', long = "body")]
    pub body: Option<PathBuf>,
}

//! Command-line argument definitions for the rungs CLI.

use clap::Parser;

/// Command-line arguments for the rungs diagram tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input diagram file
    #[arg(help = "Path to the input file")]
    pub input: String,

    /// Path to the output file. Defaults to the input path with the
    /// extension swapped for the output type's.
    #[arg(short, long)]
    pub output: Option<String>,

    /// Output type (svg, pdf, json)
    #[arg(short = 't', long, default_value = "svg")]
    pub out_type: String,

    /// Property override, as name=value or a bare name for flags.
    /// May be given several times.
    #[arg(short, long = "property")]
    pub properties: Vec<String>,

    /// Leave the project link out of the drawing
    #[arg(long)]
    pub no_link: bool,

    /// Path to a replacement CSS stylesheet (SVG output only)
    #[arg(long)]
    pub css: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

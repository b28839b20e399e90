//! CLI logic for the rungs diagram tool.

pub mod error_adapter;

mod args;

pub use args::Args;

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use rungs::{OutputKind, RenderOptions, RungsError};

/// Run the rungs CLI application.
///
/// Reads the input file, renders it in the requested format, and writes
/// the result to the output path. A partially written output file is
/// removed on failure.
pub fn run(args: &Args) -> Result<(), RungsError> {
    // Resolve the output kind up front so a typo fails before any I/O.
    let output: OutputKind = args.out_type.parse()?;

    let source = fs::read_to_string(&args.input)?;
    let css = args.css.as_ref().map(fs::read_to_string).transpose()?;

    let out_path = match &args.output {
        Some(path) => PathBuf::from(path),
        None => default_output(&args.input, output),
    };

    info!(
        input = args.input,
        output = out_path.display().to_string();
        "rendering"
    );

    let opts = RenderOptions {
        output,
        properties: args.properties.clone(),
        no_link: args.no_link,
        css,
    };

    let mut file = fs::File::create(&out_path)?;
    if let Err(err) = rungs::render(&source, &opts, &mut file) {
        drop(file);
        let _ = fs::remove_file(&out_path);
        return Err(err);
    }

    info!(output = out_path.display().to_string(); "wrote diagram");
    Ok(())
}

/// The input path with its extension swapped for the output kind's.
fn default_output(input: &str, kind: OutputKind) -> PathBuf {
    Path::new(input).with_extension(kind.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_swaps_the_extension() {
        assert_eq!(
            default_output("demo/greet.seq", OutputKind::Pdf),
            PathBuf::from("demo/greet.pdf")
        );
        assert_eq!(
            default_output("plain", OutputKind::Svg),
            PathBuf::from("plain.svg")
        );
    }
}

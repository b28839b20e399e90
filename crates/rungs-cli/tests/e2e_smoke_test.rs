use std::{fs, path::PathBuf};

use tempfile::tempdir;

use rungs_cli::Args;

/// Collects all .seq files from a directory
fn collect_seq_files(dir: PathBuf) -> Vec<PathBuf> {
    let mut files = if let Ok(entries) = fs::read_dir(&dir) {
        entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("seq")
            })
            .collect()
    } else {
        Vec::new()
    };

    // Sort for consistent test output
    files.sort();
    files
}

fn args_for(input: &PathBuf, output: &PathBuf, out_type: &str) -> Args {
    Args {
        input: input.to_string_lossy().to_string(),
        output: Some(output.to_string_lossy().to_string()),
        out_type: out_type.to_string(),
        properties: Vec::new(),
        no_link: false,
        css: None,
        log_level: "off".to_string(),
    }
}

#[test]
fn e2e_smoke_test_demos() {
    let temp_dir = tempdir().expect("Failed to create temp directory");

    let demos = collect_seq_files(PathBuf::from("../../demos"));
    assert!(!demos.is_empty(), "No demo files found in demos/");

    let mut failures = Vec::new();

    for demo in &demos {
        for out_type in ["svg", "pdf", "json"] {
            let output_name = format!(
                "{}.{out_type}",
                demo.file_stem().unwrap().to_string_lossy()
            );
            let output_path = temp_dir.path().join(output_name);

            let args = args_for(demo, &output_path, out_type);
            if let Err(e) = rungs_cli::run(&args) {
                failures.push((demo.clone(), out_type, e));
                continue;
            }

            let written = fs::metadata(&output_path).expect("output file missing");
            assert!(written.len() > 0, "empty output for {}", demo.display());
        }
    }

    if !failures.is_empty() {
        eprintln!("\nDemos that failed:");
        for (path, out_type, err) in &failures {
            eprintln!("  - {} ({out_type}): {err}", path.display());
        }
        panic!("{} demo render(s) failed unexpectedly", failures.len());
    }
}

#[test]
fn e2e_bad_input_fails_and_removes_output() {
    let temp_dir = tempdir().expect("Failed to create temp directory");
    let input = temp_dir.path().join("bad.seq");
    fs::write(&input, "advance nope\n").unwrap();
    let output = temp_dir.path().join("bad.svg");

    let args = args_for(&input, &output, "svg");
    assert!(rungs_cli::run(&args).is_err());
    assert!(!output.exists(), "partial output should be removed");
}

#[test]
fn e2e_unknown_output_type_fails_before_reading_input() {
    let missing = PathBuf::from("no/such/file.seq");
    let output = PathBuf::from("never-written.gif");
    let args = args_for(&missing, &output, "gif");
    let err = rungs_cli::run(&args).unwrap_err();
    assert!(err.to_string().contains("invalid output type"));
}

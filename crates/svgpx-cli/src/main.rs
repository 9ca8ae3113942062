use std::{fs, process::ExitCode};

use clap::Parser;
use svgpx::{CompileOptions, compile, compile_annotated};

/// Compile a small SVG-path DSL into path data, text layers, or an
/// annotated execution transcript.
#[derive(Parser, Debug)]
#[command(name = "svgpx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Inline source code (mutually exclusive with --src).
    #[arg(short = 'e', long = "eval", value_name = "CODE")]
    eval: Option<String>,

    /// Path to a source file (mutually exclusive with -e).
    #[arg(long = "src", value_name = "PATH")]
    src: Option<std::path::PathBuf>,

    /// Write the compiled output (JSON) to a file instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "PATH")]
    output: Option<std::path::PathBuf>,

    /// Write a standalone SVG document wrapping the default layer's path
    /// data to this file.
    #[arg(long = "output-svg-file", value_name = "PATH")]
    output_svg_file: Option<std::path::PathBuf>,

    /// `viewBox` attribute for --output-svg-file.
    #[arg(long = "viewBox", value_name = "VALUE")]
    view_box: Option<String>,

    /// `width` attribute for --output-svg-file.
    #[arg(long, value_name = "VALUE")]
    width: Option<String>,

    /// `height` attribute for --output-svg-file.
    #[arg(long, value_name = "VALUE")]
    height: Option<String>,

    /// `stroke` attribute on the emitted `<path>`.
    #[arg(long, value_name = "VALUE", default_value = "black")]
    stroke: String,

    /// `fill` attribute on the emitted `<path>`.
    #[arg(long, value_name = "VALUE", default_value = "none")]
    fill: String,

    /// `stroke-width` attribute on the emitted `<path>`.
    #[arg(long = "stroke-width", value_name = "VALUE", default_value = "1")]
    stroke_width: String,

    /// Print the annotated execution transcript instead of compiling.
    #[arg(long)]
    annotated: bool,

    /// Round emitted numbers to this many decimal places.
    #[arg(long = "to-fixed", value_name = "N")]
    to_fixed: Option<u32>,

    /// Seed the stdlib `random()` generator for deterministic output.
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match read_source(&cli) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let options = CompileOptions {
        to_fixed: cli.to_fixed,
        seed_random: cli.seed,
    };

    if cli.annotated {
        return match compile_annotated(&source, options) {
            Ok(transcript) => write_output(&cli.output, &transcript),
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let result = match compile(&source, options) {
        Ok(result) => result,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(svg_path) = &cli.output_svg_file {
        let Some(path) = &result.path else {
            eprintln!("error: no path data to write (default layer is not a PathLayer)");
            return ExitCode::FAILURE;
        };
        let svg = render_svg_document(&cli, path);
        if let Err(err) = fs::write(svg_path, svg) {
            eprintln!("error: failed to write {svg_path:?}: {err}");
            return ExitCode::FAILURE;
        }
    }

    let json = match serde_json::to_string_pretty(&result) {
        Ok(json) => json,
        Err(err) => {
            eprintln!("error: failed to serialize result: {err}");
            return ExitCode::FAILURE;
        }
    };
    write_output(&cli.output, &json)
}

fn read_source(cli: &Cli) -> Result<String, String> {
    match (&cli.eval, &cli.src) {
        (Some(code), None) => Ok(code.clone()),
        (None, Some(path)) => fs::read_to_string(path).map_err(|err| format!("failed to read {path:?}: {err}")),
        (Some(_), Some(_)) => Err("-e/--eval and --src are mutually exclusive".to_string()),
        (None, None) => Err("one of -e/--eval or --src is required".to_string()),
    }
}

fn render_svg_document(cli: &Cli, path_data: &str) -> String {
    let view_box = cli.view_box.as_deref().unwrap_or("0 0 100 100");
    let width = cli.width.as_deref().unwrap_or("100");
    let height = cli.height.as_deref().unwrap_or("100");
    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"{view_box}\" width=\"{width}\" height=\"{height}\">\n  \
         <path d=\"{path_data}\" stroke=\"{stroke}\" fill=\"{fill}\" stroke-width=\"{stroke_width}\"/>\n</svg>\n",
        stroke = cli.stroke,
        fill = cli.fill,
        stroke_width = cli.stroke_width,
    )
}

fn write_output(output: &Option<std::path::PathBuf>, content: &str) -> ExitCode {
    match output {
        Some(path) => match fs::write(path, content) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: failed to write {path:?}: {err}");
                ExitCode::FAILURE
            }
        },
        None => {
            println!("{content}");
            ExitCode::SUCCESS
        }
    }
}

//! corscribe CLI: parse a clinical note file and print the rendered
//! document (or JSON), or preview detected sections.

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use corscribe::pipeline::{parse_and_render, parse_clinical_note, parse_with};
use corscribe::{CoreError, ParseOptions, ReferenceData, TemplateId};

const EXIT_INPUT_TOO_LARGE: i32 = 2;
const EXIT_UNREADABLE_INPUT: i32 = 3;
const EXIT_INVALID_OPTION: i32 = 4;

#[derive(Parser)]
#[command(
    name = "corscribe",
    version,
    about = "Deterministic clinical note structuring for cardiology workflows",
    after_help = "Examples:\n  corscribe parse --input note.txt --template CIS\n  corscribe parse --input note.txt --template Progress --smart-phrase on --json\n  corscribe preview --input note.txt\n"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a note and print the rendered document.
    Parse(ParseArgs),
    /// Print detected sections with scores and line counts.
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
struct ParseArgs {
    #[arg(long)]
    input: PathBuf,
    /// CIS, Consult, or Progress.
    #[arg(long, default_value = "CIS")]
    template: String,
    /// on or off.
    #[arg(long = "smart-phrase", default_value = "off")]
    smart_phrase: String,
    /// on or off.
    #[arg(long = "include-unmapped", default_value = "on")]
    include_unmapped: String,
    /// us or si rendering units.
    #[arg(long, default_value = "us")]
    units: String,
    /// Emit the full ParsedNote and rendered text as JSON.
    #[arg(long)]
    json: bool,
    /// Directory with replacement reference JSON files.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PreviewArgs {
    #[arg(long)]
    input: PathBuf,
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Parse(args) => run_parse(&args),
        Commands::Preview(args) => run_preview(&args),
    };
    process::exit(code);
}

fn read_input(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn parse_on_off(value: &str) -> Result<bool, CoreError> {
    match value.to_ascii_lowercase().as_str() {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(CoreError::InvalidOption(format!(
            "expected on|off, got '{value}'"
        ))),
    }
}

fn parse_units(value: &str) -> Result<corscribe::LocaleUnits, CoreError> {
    match value.to_ascii_lowercase().as_str() {
        "us" => Ok(corscribe::LocaleUnits::Us),
        "si" => Ok(corscribe::LocaleUnits::Si),
        _ => Err(CoreError::InvalidOption(format!(
            "expected us|si, got '{value}'"
        ))),
    }
}

fn build_options(args: &ParseArgs) -> Result<ParseOptions, CoreError> {
    Ok(ParseOptions {
        template: TemplateId::parse(&args.template)?,
        smart_phrase: parse_on_off(&args.smart_phrase)?,
        include_unmapped: parse_on_off(&args.include_unmapped)?,
        locale_units: parse_units(&args.units)?,
        ..ParseOptions::default()
    })
}

fn exit_code_for(err: &CoreError) -> i32 {
    match err {
        CoreError::InputTooLarge { .. } => EXIT_INPUT_TOO_LARGE,
        CoreError::InvalidOption(_) => EXIT_INVALID_OPTION,
        CoreError::StaticDataMissing(_) => EXIT_UNREADABLE_INPUT,
    }
}

fn run_parse(args: &ParseArgs) -> i32 {
    let opts = match build_options(args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("{e}");
            return exit_code_for(&e);
        }
    };

    let text = match read_input(&args.input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e:#}");
            return EXIT_UNREADABLE_INPUT;
        }
    };

    let result = match &args.data_dir {
        Some(dir) => {
            let refdata = match ReferenceData::from_dir(dir) {
                Ok(rd) => rd,
                Err(e) => {
                    eprintln!("{e}");
                    return exit_code_for(&e);
                }
            };
            parse_with(&text, &opts, &refdata, None).map(|parsed| {
                let rendered = corscribe::render::render(&parsed, opts.template, &opts, &refdata);
                (parsed, rendered)
            })
        }
        None => parse_and_render(&text, &opts),
    };

    let (mut parsed, rendered) = match result {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("{e}");
            return exit_code_for(&e);
        }
    };
    parsed.meta.source = Some(args.input.display().to_string());

    if args.json {
        #[derive(serde::Serialize)]
        struct Output<'a> {
            parsed: &'a corscribe::ParsedNote,
            rendered: &'a corscribe::RenderedNote,
        }
        match serde_json::to_string_pretty(&Output {
            parsed: &parsed,
            rendered: &rendered,
        }) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("serialization failed: {e}");
                return 1;
            }
        }
    } else {
        print!("{}", rendered.text);
    }
    0
}

fn run_preview(args: &PreviewArgs) -> i32 {
    let text = match read_input(&args.input) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{e:#}");
            return EXIT_UNREADABLE_INPUT;
        }
    };

    let note = match parse_clinical_note(&text, &ParseOptions::default()) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("{e}");
            return exit_code_for(&e);
        }
    };

    for section in note.sections.values() {
        let lines = section.raw_text.split('\n').filter(|l| !l.trim().is_empty()).count();
        println!(
            "- {}: score {:.2}, {} line(s), {} chars",
            section.tag.canonical_label(),
            section.confidence,
            lines,
            section.raw_text.len()
        );
    }
    if !note.unknown_text.is_empty() {
        println!("- Unmapped: {} block(s)", note.unknown_text.len());
    }
    println!("Overall confidence: {:.2}", note.confidence_overall);
    0
}

//! `deliverydata` command line tool

mod commands;
mod logging;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use deliverydata::ConversionConfig;
use std::path::PathBuf;
use std::process::ExitCode;

fn plan_arg() -> Arg {
    Arg::new("plan")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("RT Plan DICOM file")
}

fn build_cli() -> Command {
    Command::new("deliverydata")
        .version(deliverydata::VERSION)
        .about("Convert DICOM RT Plans to and from delivery data")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML conversion config (beam_matching, gantry_tolerance, value_tolerance)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("warn")
                .help("Log filter used when RUST_LOG is not set"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("extract")
                .about("Write a plan's delivery data as JSON")
                .arg(plan_arg())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_parser(value_parser!(PathBuf))
                        .help("Output file (stdout if omitted)"),
                ),
        )
        .subcommand(
            Command::new("apply")
                .about("Rebuild a plan from delivery data and a template plan")
                .arg(
                    Arg::new("delivery")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Delivery data JSON file"),
                )
                .arg(
                    Arg::new("template")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Template RT Plan DICOM file"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Output DICOM file"),
                ),
        )
        .subcommand(
            Command::new("roundtrip")
                .about("Extract and rebuild a plan, and check nothing changed")
                .arg(plan_arg()),
        )
        .subcommand(
            Command::new("summary")
                .about("Show beams, control points and gantry angles")
                .arg(plan_arg())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Print every element of a DICOM file")
                .arg(plan_arg()),
        )
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<ConversionConfig> {
    match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            let config = ConversionConfig::from_file(path)?;
            tracing::info!("Loaded config from {}", path.display());
            Ok(config)
        }
        None => Ok(ConversionConfig::default()),
    }
}

/// Matches of the selected subcommand, where global options are also visible
fn selected(matches: &ArgMatches) -> &ArgMatches {
    matches.subcommand().map_or(matches, |(_, args)| args)
}

fn run(matches: &ArgMatches) -> anyhow::Result<ExitCode> {
    let Some((name, args)) = matches.subcommand() else {
        return Ok(ExitCode::FAILURE);
    };
    let config = load_config(args)?;
    let path = |arg: &str| args.get_one::<PathBuf>(arg).cloned().unwrap_or_default();

    match name {
        "extract" => commands::extract(&path("plan"), args.get_one::<PathBuf>("output").map(PathBuf::as_path)),
        "apply" => commands::apply(&config, &path("delivery"), &path("template"), &path("output")),
        "roundtrip" => commands::roundtrip(&config, &path("plan")),
        "summary" => commands::summary(&path("plan"), args.get_flag("json")),
        "dump" => commands::dump(&path("plan")),
        _ => Ok(ExitCode::FAILURE),
    }
}

fn main() -> ExitCode {
    let matches = build_cli().get_matches();

    let options = selected(&matches);
    let level = options
        .get_one::<String>("log-level")
        .map_or("warn", String::as_str);
    if let Err(err) = logging::init(level, options.get_flag("log-json")) {
        eprintln!("warning: logging disabled: {err}");
    }

    match run(&matches) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

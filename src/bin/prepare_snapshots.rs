use std::path::PathBuf;
use std::process::ExitCode;

use churnprep::{
    init_logging, log_app_start, logging_config_from_env, parse_hash_algorithm, parse_output_mode,
    pepper_from_env, run_prepare, DateParsePolicy, HashAlgorithm, OutputMode, PrepareRunConfig,
    SinkSet,
};

const USAGE: &str = "usage: prepare_snapshots --input <dir> --data-root <dir> \
    [--output-mode none|public|private|final|all] [--algorithm sha256|md5] [--skip-bad-dates]";

struct Args {
    input_dir: PathBuf,
    data_root: PathBuf,
    output_mode: OutputMode,
    algorithm: HashAlgorithm,
    date_policy: DateParsePolicy,
}

fn parse_args() -> Result<Args, String> {
    let mut input_dir = None;
    let mut data_root = None;
    let mut output_mode = OutputMode::All;
    let mut algorithm = HashAlgorithm::Sha256;
    let mut date_policy = DateParsePolicy::Strict;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--input" => {
                input_dir = Some(PathBuf::from(
                    args.next().ok_or("--input requires a value")?,
                ));
            }
            "--data-root" => {
                data_root = Some(PathBuf::from(
                    args.next().ok_or("--data-root requires a value")?,
                ));
            }
            "--output-mode" => {
                let raw = args.next().ok_or("--output-mode requires a value")?;
                output_mode = parse_output_mode(&raw).map_err(|e| e.to_string())?;
            }
            "--algorithm" => {
                let raw = args.next().ok_or("--algorithm requires a value")?;
                algorithm = parse_hash_algorithm(&raw).map_err(|e| e.to_string())?;
            }
            "--skip-bad-dates" => date_policy = DateParsePolicy::ReportAndSkip,
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }

    Ok(Args {
        input_dir: input_dir.ok_or("--input is required")?,
        data_root: data_root.ok_or("--data-root is required")?,
        output_mode,
        algorithm,
        date_policy,
    })
}

fn main() -> ExitCode {
    let logging = logging_config_from_env();
    if let Err(err) = init_logging(&logging) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }
    log_app_start("prepare_snapshots", &logging);

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    // The pepper is the one piece of config that must come from the
    // environment; refuse to start without it.
    let pepper = match pepper_from_env() {
        Ok(pepper) => pepper,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let config = PrepareRunConfig {
        input_dir: args.input_dir,
        data_root: args.data_root,
        pepper,
        algorithm: args.algorithm,
        sinks: SinkSet::from_mode(args.output_mode),
        date_policy: args.date_policy,
    };

    match run_prepare(&config) {
        Ok(report) => {
            let rendered = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|_| format!("{report:?}"));
            println!("{rendered}");
            if report.files_failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("prepare run failed: {err}");
            ExitCode::FAILURE
        }
    }
}

use std::path::PathBuf;
use std::process::ExitCode;

use churnprep::{
    init_logging, log_app_start, logging_config_from_env, parse_output_mode, run_combine,
    summary_statistics, CombineRunConfig, OutputMode, SinkSet,
};

const USAGE: &str = "usage: combine_snapshots --later <prepared.csv> --earlier <prepared.csv> \
    --data-root <dir> [--output-mode none|final|all] [--describe]";

struct Args {
    later_file: PathBuf,
    earlier_file: PathBuf,
    data_root: PathBuf,
    output_mode: OutputMode,
    describe: bool,
}

fn parse_args() -> Result<Args, String> {
    let mut later_file = None;
    let mut earlier_file = None;
    let mut data_root = None;
    let mut output_mode = OutputMode::Final;
    let mut describe = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--later" => {
                later_file = Some(PathBuf::from(
                    args.next().ok_or("--later requires a value")?,
                ));
            }
            "--earlier" => {
                earlier_file = Some(PathBuf::from(
                    args.next().ok_or("--earlier requires a value")?,
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
            "--describe" => describe = true,
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }

    Ok(Args {
        later_file: later_file.ok_or("--later is required")?,
        earlier_file: earlier_file.ok_or("--earlier is required")?,
        data_root: data_root.ok_or("--data-root is required")?,
        output_mode,
        describe,
    })
}

fn main() -> ExitCode {
    let logging = logging_config_from_env();
    if let Err(err) = init_logging(&logging) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }
    log_app_start("combine_snapshots", &logging);

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}\n{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    let config = CombineRunConfig {
        later_file: args.later_file,
        earlier_file: args.earlier_file,
        data_root: args.data_root,
        sinks: SinkSet::from_mode(args.output_mode),
    };

    match run_combine(&config) {
        Ok((combined, report)) => {
            if args.describe {
                for summary in summary_statistics(&combined) {
                    println!(
                        "{:<45} count={:<7} mean={:>14.4} std={:>14.4} min={:>14.4} max={:>14.4}",
                        summary.column,
                        summary.count,
                        summary.mean,
                        summary.std,
                        summary.min,
                        summary.max
                    );
                }
            }
            let rendered = serde_json::to_string_pretty(&report)
                .unwrap_or_else(|_| format!("{report:?}"));
            println!("{rendered}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("combine run failed: {err}");
            ExitCode::FAILURE
        }
    }
}

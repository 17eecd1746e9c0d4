use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use libprep_stats::config::AnalysisConfig;
use libprep_stats::error::StatsResult;
use libprep_stats::run_analysis;

const USAGE: &str = "usage: libprep-stats <analysis.yaml> [report.tsv]";

fn spinner(colour: &str, msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let template = format!("{{spinner:.{}}} {{msg}}", colour);
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        .template(&template)
    {
        spinner.set_style(style);
    }
    spinner.set_message(msg);
    spinner
}

fn run(config_path: PathBuf, report_path: Option<PathBuf>) -> StatsResult<()> {
    // 1. Config
    let sp = spinner("blue", "Reading analysis config...");
    let config = AnalysisConfig::from_path(&config_path)?;
    sp.finish_with_message(format!("Config lists {} read table(s).", config.reads.len()));

    // 2. Statistics
    let sp = spinner("green", "Computing library-prep statistics...");
    let results = run_analysis(&config)?;
    sp.finish_with_message(format!("Summarized {} run(s).", results.run_summaries.len()));

    // 3. Report
    let report = results.summary_report();
    match report_path {
        Some(path) => {
            let sp = spinner("yellow", "Writing report...");
            fs::write(&path, report)?;
            sp.finish_with_message(format!("Report written to {}.", path.display()));
        }
        None => print!("{}", report),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut args = std::env::args_os().skip(1);
    let Some(config_path) = args.next().map(PathBuf::from) else {
        eprintln!("{}", USAGE);
        return ExitCode::from(2);
    };
    let report_path = args.next().map(PathBuf::from);

    match run(config_path, report_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

use std::path::{Path, PathBuf};
use std::process;

use crate::plan::{default_plan, run_plan, DrawPlan, RunSummary};

#[derive(Debug, Default, PartialEq)]
struct HeadlessArgs {
    plan_path: Option<PathBuf>,
    save_path: Option<PathBuf>,
    print: bool,
}

pub fn run(args: &[String]) -> Result<(), String> {
    let parsed = parse_headless_args(args)?;
    let plan = if let Some(path) = parsed.plan_path.as_deref() {
        load_plan(path)?
    } else {
        tracing::info!("headless: no --plan given, running the built-in plan");
        default_plan()
    };

    let summary = run_plan(&plan)?;

    if let Some(path) = parsed.save_path {
        save_summary_json(&summary, &path)?;
        tracing::info!("headless: saved summary to {:?}", path);
    }

    if parsed.print {
        let json = serde_json::to_string_pretty(&summary).map_err(|err| err.to_string())?;
        println!("{json}");
    }

    tracing::info!(
        "headless: completed {} steps, {} labels",
        summary.steps.len(),
        summary.labels.len()
    );
    Ok(())
}

fn parse_headless_args(args: &[String]) -> Result<HeadlessArgs, String> {
    let mut parsed = HeadlessArgs::default();
    let mut iter = args.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--plan" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--plan requires a path".to_string())?;
                parsed.plan_path = Some(PathBuf::from(value));
            }
            "--save" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "--save requires a path".to_string())?;
                parsed.save_path = Some(PathBuf::from(value));
            }
            "--print" => {
                parsed.print = true;
            }
            "--log-level" => {
                iter.next();
            }
            "--help" | "-h" => {
                print_headless_help();
                process::exit(0);
            }
            other => return Err(format!("unknown argument '{other}'")),
        }
    }

    Ok(parsed)
}

fn print_headless_help() {
    println!(
        "voxdraw options:\n  --plan <path>\n  --save <path>\n  --print\n  --log-level <error|warn|info|debug|trace>"
    );
}

fn load_plan(path: &Path) -> Result<DrawPlan, String> {
    let data = std::fs::read(path).map_err(|err| err.to_string())?;
    let mut plan: DrawPlan = serde_json::from_slice(&data).map_err(|err| err.to_string())?;
    plan.settings.normalize();
    Ok(plan)
}

fn save_summary_json(summary: &RunSummary, path: &Path) -> Result<(), String> {
    let data = serde_json::to_vec_pretty(summary).map_err(|err| err.to_string())?;
    std::fs::write(path, data).map_err(|err| err.to_string())
}

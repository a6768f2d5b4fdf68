use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Arg, ArgAction, Command};
use eframe::egui;

use research_buddy::gui::frontend::ResearchApp;
use research_buddy::model_client::GeminiClient;
use research_buddy::persistence::settings::AppSettings;
use research_buddy::session::{AnalysisStatus, Orchestrator};

fn cli() -> Command {
    Command::new("Research-Buddy")
        .about("Turn research papers into a validated method graph, summary and reproduction code")
        .arg(
            Arg::new("headless")
                .long("headless")
                .action(ArgAction::SetTrue)
                .help("Analyze FILES without opening a window and print the result as JSON"),
        )
        .arg(
            Arg::new("files")
                .value_name("FILES")
                .num_args(0..)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Papers to analyze (queued in the window unless --headless)"),
        )
}

fn main() -> ExitCode {
    env_logger::init();
    let matches = cli().get_matches();
    let files: Vec<PathBuf> = matches.get_many::<PathBuf>("files").map(|v| v.cloned().collect()).unwrap_or_default();
    let settings = AppSettings::load().unwrap_or_else(|e| {
        log::warn!("could not read settings, using defaults: {:#}", e);
        AppSettings::default()
    });

    let outcome = if matches.get_flag("headless") {
        run_headless(settings, files)
    } else {
        run_gui(settings, files)
    };
    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_headless(settings: AppSettings, files: Vec<PathBuf>) -> anyhow::Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let client = GeminiClient::from_settings(&settings)?;
    let mut orchestrator = Orchestrator::new(Arc::new(client), runtime.handle().clone()).with_temperature(settings.temperature);

    if let Err(e) = orchestrator.submit(files) {
        eprintln!("{}", e.user_message());
        return Ok(ExitCode::FAILURE);
    }
    let status = runtime.block_on(orchestrator.wait_until_settled());
    let snapshot = orchestrator.snapshot();
    for w in &snapshot.warnings {
        log::warn!("{}: {}", w.path, w.message);
    }
    match (status, snapshot.result) {
        (AnalysisStatus::Complete, Some(result)) => {
            println!("{}", serde_json::to_string_pretty(result.as_ref())?);
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            eprintln!("{}", snapshot.error.unwrap_or_else(|| format!("analysis ended in state {}", status)));
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_gui(settings: AppSettings, files: Vec<PathBuf>) -> anyhow::Result<ExitCode> {
    let app = ResearchApp::new(settings, files)?;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            // Keep the graph canvas and tabs usable on small screens
            .with_min_inner_size([700.0, 480.0])
            .with_resizable(true)
            .with_drag_and_drop(true),
        ..Default::default()
    };
    eframe::run_native("Research-Buddy", options, Box::new(move |_cc| Ok(Box::new(app) as Box<dyn eframe::App>)))
        .map_err(|e| anyhow::anyhow!("window failed: {}", e))?;
    Ok(ExitCode::SUCCESS)
}

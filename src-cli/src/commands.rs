//! CLI command implementations.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use subforge_common::{ProgressEvent, TranscriptionPhase, WhisperModel, WHISPER_MODELS};
use subforge_engine::assets::WHISPER_VERSION;
use subforge_engine::ffmpeg::resolve_ffmpeg_path;
use subforge_engine::transcription::timecode::format_clock;
use subforge_engine::{
    AssetProvider, EngineConfig, LocalAssets, Orchestrator, TranscriptionError, TranscriptionRequest,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::colors;
use crate::exit_codes::ExitCode;
use crate::TranscribeArgs;

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

fn local_assets(config: &EngineConfig) -> LocalAssets {
    LocalAssets::new(config.data_dir(), config.whisper_path.clone())
}

/// Resolves when the user asks the process to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to set up SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to set up Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

/// Renders progress events as a status line on stderr and transcript lines on stdout.
struct ProgressView {
    json: bool,
    quiet: bool,
    interactive: bool,
    line_open: bool,
    last_phase: Option<TranscriptionPhase>,
}

impl ProgressView {
    fn new(json: bool, quiet: bool) -> Self {
        Self {
            json,
            quiet,
            interactive: colors::is_stderr_interactive(),
            line_open: false,
            last_phase: None,
        }
    }

    fn clear_line(&mut self) {
        if self.line_open {
            eprint!("\r\x1b[2K");
            self.line_open = false;
        }
    }

    fn finish_line(&mut self) {
        if self.line_open {
            eprintln!();
            self.line_open = false;
        }
    }

    fn show(&mut self, event: &ProgressEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to serialize progress event: {}", e),
            }
            return;
        }
        if self.quiet || event.phase.is_terminal() {
            return;
        }

        if let (Some(text), Some(stamp)) = (&event.segment_text, &event.segment_timestamp) {
            self.clear_line();
            println!("{} {}", colors::timestamp(stamp), text);
        }

        let timing = match (event.elapsed_sec, event.total_duration_sec) {
            (Some(elapsed), Some(total)) => format!(" {} / {}", format_clock(elapsed), format_clock(total)),
            _ => String::new(),
        };
        let status = format!("{} {:>3}%{}", colors::phase(event.phase), event.percent, timing);

        if self.interactive {
            eprint!("\r\x1b[2K{}", status);
            let _ = std::io::stderr().flush();
            self.line_open = true;
        } else if self.last_phase != Some(event.phase) {
            eprintln!("{}", status);
        }
        self.last_phase = Some(event.phase);
    }
}

/// Transcribe audio files into one SRT file.
pub async fn transcribe(
    args: TranscribeArgs,
    config: EngineConfig,
    json: bool,
    quiet: bool,
    verbose: bool,
) -> ExitCode {
    let mut request = TranscriptionRequest::new(
        args.inputs.iter().map(|raw| expand_path(raw)).collect(),
        args.model,
    );
    request.output_path = args.output.as_deref().map(expand_path);
    request.language = args.language;
    request.threads = args.threads;

    if verbose && !quiet && !json {
        eprintln!(
            "{} {} input(s) with the {} model",
            colors::dim("Transcribing"),
            request.inputs.len(),
            request.model
        );
    }

    let orchestrator = Arc::new(Orchestrator::new(config));
    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();

    let runner = orchestrator.clone();
    let run = tokio::spawn(async move { runner.transcribe(request, Arc::new(tx)).await });

    let canceller = orchestrator.clone();
    let signal_task = tokio::spawn(async move {
        shutdown_signal().await;
        debug!("Interrupt received, cancelling transcription");
        canceller.cancel().await;
    });

    let mut view = ProgressView::new(json, quiet);
    // The channel closes once the run drops its sink
    while let Some(event) = rx.recv().await {
        view.show(&event);
    }
    signal_task.abort();

    let result = match run.await {
        Ok(result) => result,
        Err(e) => {
            view.finish_line();
            if !quiet {
                eprintln!("{}", colors::error(&format!("Transcription task failed: {}", e)));
            }
            return ExitCode::GeneralError;
        }
    };
    view.finish_line();

    match result {
        Ok(path) => {
            if !json && !quiet {
                println!(
                    "{} {}",
                    colors::success("Subtitles saved:"),
                    colors::path(&path.display().to_string())
                );
            } else if quiet && !json {
                println!("{}", path.display());
            }
            ExitCode::Success
        }
        Err(TranscriptionError::Cancelled) => {
            if json {
                println!(r#"{{"phase": "cancelled"}}"#);
            } else if !quiet {
                eprintln!("{}", colors::dim("Transcription cancelled."));
            }
            ExitCode::UserCancelled
        }
        Err(e) => {
            // In JSON mode the error event has already been printed
            if !json && !quiet {
                eprintln!("{}", colors::error(&e.to_string()));
            }
            ExitCode::from_error(&e)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelRow {
    id: WhisperModel,
    name: &'static str,
    size: &'static str,
    description: &'static str,
    downloaded: bool,
    path: PathBuf,
}

/// List whisper models and whether each is downloaded.
pub fn models(config: &EngineConfig, json: bool, quiet: bool) -> ExitCode {
    let assets = local_assets(config);
    let rows: Vec<ModelRow> = WHISPER_MODELS
        .iter()
        .map(|info| ModelRow {
            id: info.id,
            name: info.name,
            size: info.size,
            description: info.description,
            downloaded: assets.is_model_ready(info.id),
            path: assets.model_path(info.id),
        })
        .collect();

    if json {
        match serde_json::to_string_pretty(&rows) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                if !quiet {
                    eprintln!("{}", colors::error(&e.to_string()));
                }
                return ExitCode::GeneralError;
            }
        }
        return ExitCode::Success;
    }

    let id_width = rows.iter().map(|r| r.id.id().len()).max().unwrap_or(2).max(2);
    let size_width = rows.iter().map(|r| r.size.len()).max().unwrap_or(4).max(4);

    println!(
        "{}  {}  {}  {}",
        colors::pad_left("ID", id_width, colors::header),
        colors::pad_left("SIZE", size_width, colors::header),
        colors::pad_left("DOWNLOADED", 10, colors::header),
        colors::header("DESCRIPTION")
    );
    println!(
        "{}  {}  {}  {}",
        "-".repeat(id_width),
        "-".repeat(size_width),
        "-".repeat(10),
        "-".repeat(11)
    );

    for row in &rows {
        let downloaded = if row.downloaded {
            colors::pad_left("yes", 10, colors::success)
        } else {
            colors::pad_left("no", 10, colors::dim)
        };
        println!(
            "{}  {:<size_width$}  {}  {}",
            colors::pad_left(row.id.id(), id_width, colors::number),
            row.size,
            downloaded,
            row.description
        );
    }

    if !quiet {
        println!();
        println!(
            "{} {}",
            colors::dim("Models directory:"),
            colors::path(&subforge_common::paths::models_dir(&config.data_dir()).display().to_string())
        );
    }
    ExitCode::Success
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    ffmpeg: Option<PathBuf>,
    whisper: Option<PathBuf>,
    model: WhisperModel,
    model_ready: bool,
}

impl CheckReport {
    fn ready(&self) -> bool {
        self.ffmpeg.is_some() && self.whisper.is_some() && self.model_ready
    }
}

/// Report whether ffmpeg, the recognizer and a model are ready to use.
pub fn check(config: &EngineConfig, model: WhisperModel, json: bool, quiet: bool) -> ExitCode {
    let assets = local_assets(config);
    let report = CheckReport {
        ffmpeg: resolve_ffmpeg_path(config.ffmpeg_path.as_deref()),
        whisper: assets.engine_path(),
        model,
        model_ready: assets.is_model_ready(model),
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("{}", colors::error(&e.to_string()));
                return ExitCode::GeneralError;
            }
        }
    } else if !quiet {
        let show = |label: &str, found: &Option<PathBuf>| match found {
            Some(path) => println!(
                "{} {}",
                colors::bold(label),
                colors::path(&path.display().to_string())
            ),
            None => println!("{} {}", colors::bold(label), colors::no()),
        };
        show("ffmpeg:     ", &report.ffmpeg);
        show("whisper-cli:", &report.whisper);
        println!(
            "{} {} ({})",
            colors::bold("model:      "),
            if report.model_ready { colors::yes() } else { colors::no() },
            report.model
        );

        if report.ffmpeg.is_none() {
            eprintln!("{}", colors::warning("ffmpeg will be downloaded on first use."));
        }
        if report.whisper.is_none() {
            if cfg!(all(windows, target_arch = "x86_64")) {
                eprintln!(
                    "{}",
                    colors::warning(&format!("whisper.cpp {} will be downloaded on first use.", WHISPER_VERSION))
                );
            } else {
                eprintln!(
                    "{}",
                    colors::warning("Install whisper.cpp so that 'whisper-cli' is on PATH, or set whisper_path in the config.")
                );
            }
        }
        if !report.model_ready {
            eprintln!("{}", colors::warning("The model will be downloaded on first use."));
        }
    }

    if report.ready() {
        ExitCode::Success
    } else {
        ExitCode::AcquisitionFailed
    }
}

/// Show version information.
pub fn version(json: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        println!(
            r#"{{"version": "{}", "whisperCpp": "{}"}}"#,
            version, WHISPER_VERSION
        );
    } else {
        println!("{} {}", colors::bold("subforge"), version);
        println!("{}", colors::dim(&format!("whisper.cpp {}", WHISPER_VERSION)));
    }
}

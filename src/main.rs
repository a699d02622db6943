#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod ui;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gpui::Application;

use gesture_capture::{config::Config, pipeline::available_cameras};

/// Record webcam landmarks for a fixed list of gesture prompts.
#[derive(Parser, Debug)]
#[command(name = "gesture-capture")]
#[command(about = "Record webcam landmarks for a list of gesture prompts")]
#[command(version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Camera device index (overrides config)
    #[arg(long)]
    camera: Option<u32>,

    /// Directory CSV files are written to (overrides config)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    dump_config: bool,

    /// List camera devices and exit
    #[arg(long)]
    list_cameras: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if args.list_cameras {
        let cameras = available_cameras().context("failed to query cameras")?;
        if cameras.is_empty() {
            println!("no cameras detected");
        }
        for camera in cameras {
            println!("{camera}");
        }
        return Ok(());
    }

    let config = load_config(&args)?;
    if args.dump_config {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    log::info!(
        "recording {} gestures into {}",
        config.session.gestures.len(),
        config.export.output_dir.display()
    );

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(index) = args.camera {
        config.camera.index = index;
    }
    if let Some(dir) = &args.output_dir {
        config.export.output_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

// Copyright (C) 2026 The beatline authors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use beatline::buffers::{AssetFetcher, BufferCache};
use beatline::config::EngineConfig;
use beatline::graph::{output, AudioGraph};
use beatline::store::{MemoryStore, StateReader};
use beatline::timeline::Timeline;
use beatline::transport::Transport;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays a timeline from start to finish.
    Play {
        /// Path to the timeline YAML file.
        timeline: PathBuf,

        /// Path to an engine configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Parses a timeline and prints what was understood.
    Check {
        /// Path to the timeline YAML file.
        timeline: PathBuf,
    },
    /// Lists the available audio output devices.
    Devices,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Play { timeline, config } => play(timeline, config).await,
        Commands::Check { timeline } => check(timeline),
        Commands::Devices => devices(),
    }
}

async fn play(timeline_path: PathBuf, config_path: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let config = match config_path {
        Some(path) => EngineConfig::deserialize(&path)?,
        None => EngineConfig::default(),
    };
    let timeline = Timeline::deserialize(&timeline_path)?;
    let duration_beats = timeline.duration_beats();
    info!(
        path = %timeline_path.display(),
        tracks = timeline.tracks().len(),
        duration_beats,
        "Timeline loaded"
    );

    let graph = Arc::new(AudioGraph::new(config.sample_rate()));
    let output = output::Output::open(graph.clone())?;
    info!(device = output.device_name(), "Playing");

    let store = Arc::new(MemoryStore::new(timeline));
    let cache = Arc::new(BufferCache::new(
        Arc::new(AssetFetcher::new()),
        config.sample_rate(),
    ));
    let transport = Arc::new(Transport::new(
        store.clone(),
        store.clone(),
        graph,
        cache,
        &config,
    ));

    transport.revalidate().await;
    transport.play();

    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let state = store.transport();
        if !state.playing || state.current_beat >= duration_beats {
            break;
        }
    }
    transport.stop();

    Ok(())
}

fn check(timeline_path: PathBuf) -> Result<(), Box<dyn Error>> {
    let timeline = Timeline::deserialize(&timeline_path)?;
    println!(
        "{} track(s), {} beat(s), {} asset(s)",
        timeline.tracks().len(),
        timeline.duration_beats(),
        timeline.asset_urls().len()
    );
    print!("{}", serde_yml::to_string(&timeline)?);
    Ok(())
}

fn devices() -> Result<(), Box<dyn Error>> {
    for name in output::list_devices()? {
        println!("{}", name);
    }
    Ok(())
}

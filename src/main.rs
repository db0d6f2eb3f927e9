mod input;
mod render;
mod scheduler;
mod settings;
mod state;
mod views;

use std::path::PathBuf;
use std::sync::mpsc;

use anyhow::{Context as _, anyhow};
use tracing::info;
use tracing_subscriber::EnvFilter;

use render::format_frame;
use scheduler::Scheduler;
use state::CounterStore;

pub const APP_ID: &str = "icu.veelume.tearing";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
    info!("Starting tearing counter demo");

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = settings::load(path.as_deref())?;
    info!(
        leaf_count = settings.leaf_count,
        render_cost = ?settings.render_cost,
        defer_increment = settings.defer_increment,
        policy = ?settings.policy,
        presses = settings.script.len(),
        "Settings loaded"
    );

    let store = CounterStore::new();
    let mut scheduler = Scheduler::new(&store, &settings);
    info!(subscribers = store.subscriber_count(), "Views mounted");

    // The script clock starts after the first frame is on screen.
    scheduler.mount();
    let (tx, mut rx) = mpsc::channel();
    let feeder = input::spawn_script(settings.script.clone(), tx);
    scheduler.run(&mut rx);
    feeder
        .join()
        .map_err(|_| anyhow!("input thread panicked"))?;

    for frame in scheduler.frames() {
        println!("{}", format_frame(frame));
    }

    let stats = serde_json::to_string(scheduler.stats()).context("serialising stats")?;
    info!(final_count = store.get_snapshot().count(), %stats, "Demo finished");
    Ok(())
}

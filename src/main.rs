use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::Parser;
use interpretive_map::app::Guide;
use interpretive_map::config::{Config, DataConfig};
use interpretive_map::map::headless::{HeadlessDom, HeadlessMap};
use interpretive_map::map::layers::{
    LINES_LAYER, POINTS_LAYER, POI_POINT_LABELS, POLYGONS_LAYER, SUBPOINTS_LAYER,
};
use interpretive_map::source::{load_collections, BundleSource, DataSource, MemoryStore};
use interpretive_map::view::Action;

/// Loads a guide's features and replays a session of user actions against it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input config file.
    #[arg(short, long)]
    config_filepath: PathBuf,
    /// YAML list of actions to replay after start-up.
    #[arg(short, long)]
    actions_filepath: Option<PathBuf>,
}

fn open_source(data: &DataConfig) -> anyhow::Result<Box<dyn DataSource>> {
    Ok(match data {
        DataConfig::Bundle { location } => {
            log::info!("Reading feature bundle from {}", location);
            Box::new(BundleSource::new(location)?)
        }
        DataConfig::Store { snapshot } => {
            log::info!("Opening document store snapshot {:?}", snapshot);
            Box::new(MemoryStore::from_snapshot_file(snapshot)?)
        }
    })
}

fn read_actions(filepath: &Path) -> anyhow::Result<Vec<Action>> {
    if !filepath.exists() {
        return Err(anyhow!("Actions file {:?} not found", filepath));
    }
    let contents = std::fs::read_to_string(filepath)?;
    Ok(serde_yaml::from_str(&contents)?)
}

/// Re-dispatches `StyleLoaded` for as long as the guide is still waiting on the style.
fn settle_style(guide: &mut Guide<HeadlessMap, HeadlessDom>) {
    while let Some(delay) = guide.style_retry_after() {
        std::thread::sleep(delay);
        guide.dispatch(Action::StyleLoaded);
    }
}

fn log_summary(guide: &Guide<HeadlessMap, HeadlessDom>) {
    let map = guide.map();
    let visible: Vec<&str> = [
        POLYGONS_LAYER,
        LINES_LAYER,
        POINTS_LAYER,
        SUBPOINTS_LAYER,
        POI_POINT_LABELS,
    ]
    .into_iter()
    .filter(|layer| map.is_visible(layer))
    .collect();
    log::info!("Style: {}", map.style_url());
    log::info!("Layers: {} installed, visible: {:?}", map.layer_count(), visible);
    log::info!(
        "Focus: {:?}, popups open: {}",
        guide.state().focused_feature_id(),
        map.popups().len()
    );
    log::info!(
        "Language: {:?}, tag filter: {:?}",
        guide.state().language(),
        guide.state().tag_filter()
    );
    log::info!("Sidebar entries: {}", guide.dom().sidebar.len());
}

fn try_main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();

    let args = Args::try_parse()?;
    let config = Config::from_file(&args.config_filepath)?;
    let actions = match &args.actions_filepath {
        Some(filepath) => read_actions(filepath)?,
        None => Vec::new(),
    };

    let source = open_source(&config.data)?;
    let loaded = load_collections(source.as_ref());

    let mut guide = Guide::new(&config, HeadlessMap::default(), HeadlessDom::default());
    guide.load_data(loaded);
    guide.map_mut().complete_style_load();
    guide.dispatch(Action::StyleLoaded);
    settle_style(&mut guide);

    log::info!("Replaying {} actions", actions.len());
    for action in actions {
        let label = format!("{:?}", action);
        if matches!(action, Action::StyleLoaded) {
            guide.map_mut().complete_style_load();
        }
        let effects = guide.dispatch(action);
        settle_style(&mut guide);
        log::info!("{} -> {} effects", label, effects.len());
        for effect in &effects {
            log::debug!("  {:?}", effect);
        }
    }

    log_summary(&guide);
    Ok(())
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("Error: {:?}", err);
        std::process::exit(1);
    }
}

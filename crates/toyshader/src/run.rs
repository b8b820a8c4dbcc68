use anyhow::{Context, Result};
use renderer::RunConfig;
use rendergraph::RenderGraph;
use shadertoy::{ShaderLoader, ShadertoyClient, ShadertoyConfig};
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Settings, ShaderInput};

pub fn run(args: Args) -> Result<()> {
    initialise_tracing();

    let settings = args.into_settings()?;
    let client = build_client(&settings)?;
    let mut loader = ShaderLoader::new().with_keyboard_channel(settings.keyboard);
    if let Some(client) = client {
        loader = loader.with_client(client);
    }

    let loaded = match &settings.input {
        ShaderInput::Remote(id) => {
            tracing::info!(shader = %id, "fetching shader from Shadertoy");
            loader.load_remote(id)
        }
        ShaderInput::Files(paths) => loader.load_paths(paths),
    }
    .context("failed to load shader")?;

    let title = if loaded.name.is_empty() {
        "toyshader".to_string()
    } else {
        format!("toyshader: {}", loaded.name)
    };
    let graph = RenderGraph::build(loaded.passes).context("invalid render graph")?;
    if let Some(frames) = settings.record_frames {
        tracing::info!(frames, dir = %settings.output_dir.display(), "will record frames");
    }

    let config = RunConfig {
        window_size: settings.window_size,
        title,
        playback: settings.playback,
        record_frames: settings.record_frames,
        output_dir: settings.output_dir,
    };
    renderer::run(config, graph)
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn build_client(settings: &Settings) -> Result<Option<ShadertoyClient>> {
    let Some(key) = settings.api_key.as_deref() else {
        return Ok(None);
    };
    if key.trim().is_empty() {
        return Ok(None);
    }
    let config = ShadertoyConfig::new(key).context("invalid Shadertoy API key configuration")?;
    let client = ShadertoyClient::new(config).context("failed to construct Shadertoy client")?;
    Ok(Some(client))
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api;
use crate::config::{self, Config};
use crate::data::{
    ApiFeedService, ApiRemixService, FeedService, MockFeedService, MockRemixService, RemixService,
};
use crate::logging;
use crate::remix::RemixDispatcher;
use crate::ui;
use crate::video::{MpvHandle, MpvOptions};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Serve the built-in sample feed instead of calling the backend.
    pub mock: bool,
    pub config_file: Option<PathBuf>,
}

pub fn run() -> Result<()> {
    run_with(RunOptions::default())
}

pub fn run_with(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let logging_enabled = logging::init().context("initialise logging")?;

    let config_path = options.config_file.clone().or_else(config::default_path);
    let display_path = friendly_path(config_path.as_ref());
    tracing::info!(config = %display_path, "starting reelfeed {}", crate::VERSION);

    let mock = options.mock || cfg.api.mock;
    let (feed_service, remix_service) = build_services(&cfg, mock)?;

    let status_message = if mock {
        "Using the built-in sample feed.".to_string()
    } else if logging_enabled {
        format!("Backend {} · config {display_path}", cfg.api.base_url)
    } else {
        format!("Backend {}", cfg.api.base_url)
    };

    let player = MpvOptions {
        mpv_path: cfg.player.mpv_path.clone(),
        extra_args: cfg.player.extra_args.clone(),
        muted: cfg.player.muted,
    };
    let launcher: ui::Launcher<MpvHandle> = Box::new(move |entry| {
        MpvHandle::spawn(&entry.video_url, entry.display_username(), &player)
    });

    let options = ui::Options {
        status_message,
        feed_service,
        remix: RemixDispatcher::new(remix_service),
        feed: cfg.feed.clone(),
    };
    let mut model = ui::Model::new(options, launcher);
    model.run()
}

fn build_services(
    cfg: &Config,
    mock: bool,
) -> Result<(Arc<dyn FeedService>, Arc<dyn RemixService>)> {
    if mock {
        tracing::info!("using mock services");
        return Ok((Arc::new(MockFeedService), Arc::new(MockRemixService::default())));
    }

    let client = api::Client::new(api::ClientConfig {
        base_url: cfg.api.base_url.clone(),
        user_agent: cfg.api.user_agent.clone(),
        timeout: cfg.api.timeout,
        http_client: None,
    })
    .context("create feed API client")?;
    let client = Arc::new(client);

    Ok((
        Arc::new(ApiFeedService::new(client.clone(), cfg.feed.page_size)),
        Arc::new(ApiRemixService::new(client)),
    ))
}

fn friendly_path(path: Option<&PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/reelfeed/config.yaml".to_string()
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::{self, Config};
use crate::data::{self, CommentService, ThreadService};
use crate::logging;
use crate::reddit;
use crate::render::TreeGlyphs;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: opts.config_file,
        env_prefix: None,
    })
    .context("load config")?;

    if let Some(path) = logging::init(&cfg.logging)? {
        tracing::info!(log = %path.display(), "reddit-stream starting");
    }

    let client = Arc::new(
        reddit::Client::new(client_config(&cfg)).context("create reddit client")?,
    );
    let thread_service: Arc<dyn ThreadService> =
        Arc::new(data::RedditThreadService::new(client.clone()));
    let comment_service: Arc<dyn CommentService> =
        Arc::new(data::RedditCommentService::new(client));

    let options = ui::Options {
        menu: cfg.menu.clone().into(),
        glyphs: if cfg.ui.ascii_tree {
            TreeGlyphs::ASCII
        } else {
            TreeGlyphs::UNICODE
        },
        refresh_interval: cfg.ui.refresh_interval,
        palette: ui::Palette::for_theme(&cfg.ui.theme),
        thread_service,
        comment_service,
        check_updates: true,
    };

    let mut model = ui::Model::new(options);
    model.run()
}

fn client_config(cfg: &Config) -> reddit::ClientConfig {
    let user_agent = if cfg.reddit.user_agent.trim().is_empty() {
        format!("reddit-stream/{}", crate::VERSION)
    } else {
        cfg.reddit.user_agent.clone()
    };
    reddit::ClientConfig {
        user_agent,
        base_url: Some(cfg.reddit.base_url.clone()).filter(|url| !url.trim().is_empty()),
        timeout: Some(cfg.reddit.timeout).filter(|timeout| !timeout.is_zero()),
        http_client: None,
    }
}

use anyhow::{Context, Result};
use std::env;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portal_bot::bot::{self, Engine, TelegramTransport};
use portal_bot::captcha::TesseractSolver;
use portal_bot::config::BotConfig;
use portal_bot::portal::ChromeLauncher;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();

    info!("Starting portal bot");

    let bot_token = env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
    let config = BotConfig::from_env()?;

    info!(
        portal_url = %config.portal.url,
        max_browser_sessions = config.portal.max_browser_sessions,
        debug_users = config.debug_users.len(),
        "Configuration loaded"
    );

    let bot = Bot::new(bot_token);
    let engine = Arc::new(Engine::new(
        config.clone(),
        Arc::new(TelegramTransport::new(bot.clone())),
        Arc::new(ChromeLauncher::new(config.portal.clone())),
        Arc::new(TesseractSolver::new(config.captcha.clone())),
    ));

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry().branch(Update::filter_message().endpoint({
        let engine = Arc::clone(&engine);
        move |msg: Message| {
            let engine = Arc::clone(&engine);
            async move { bot::message_handler(msg, engine).await }
        }
    }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

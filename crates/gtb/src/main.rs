use std::sync::Arc;

use gtb_core::{config::Config, model::ModelPort};
use gtb_gemini::GeminiClient;

#[tokio::main]
async fn main() -> Result<(), gtb_core::Error> {
    gtb_core::logging::init("gtb")?;

    let cfg = Arc::new(Config::load()?);
    let model: Arc<dyn ModelPort> = Arc::new(GeminiClient::new(cfg.gemini_api_key.clone()));

    gtb_telegram::router::run(cfg, model)
        .await
        .map_err(|e| gtb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}

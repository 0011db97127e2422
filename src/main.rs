use anyhow::Context;
use biblio_kernel::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load biblio settings")?;
    biblio_telemetry::init(&settings.telemetry);

    biblio_app::run(settings).await
}

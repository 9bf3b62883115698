use anyhow::Result;
use holdwatch_cli::app;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}

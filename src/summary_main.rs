use anyhow::Result;

use case_summaries::app;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    app::main().await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists; must happen before configuration is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    keystash::cli::run_cli().await
}

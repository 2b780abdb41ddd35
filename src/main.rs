#[tokio::main]
async fn main() -> anyhow::Result<std::process::ExitCode> {
    // Load .env file if it exists; must happen before any config is read
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    pgrotate::cli::run_cli().await
}

use color_eyre::eyre::{Result, WrapErr};
use reqecho::db::{self, DbConfig};
use reqecho::http::{HttpConfig, HttpEchoServer};
use reqecho::EchoServerTrait;

use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("reqecho=info")
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.to_lowercase()).as_deref() {
        None => {
            let config = HttpConfig::default();
            info!(address = %config.bind_addr, "Starting HTTP echo server");

            let server = HttpEchoServer::new(config);
            server.run().await.wrap_err("Failed to run HTTP echo server")?;
        }
        Some("db-ping") => {
            let config = DbConfig::from_env().wrap_err("Incomplete database configuration")?;
            db::probe(&config)
                .await
                .wrap_err("Database liveness check failed")?;
        }
        Some(_) => {
            eprintln!("Usage: {} [db-ping]", args[0]);
            eprintln!("  (no argument): Run the HTTP echo server on port 8080");
            eprintln!("  db-ping:       Ping the MongoDB cluster named by MONGODB_CLUSTER_ADDRESS,");
            eprintln!("                 MONGODB_USERNAME, MONGODB_PASSWORD and MONGODB_DB_NAME");
            std::process::exit(1);
        }
    }

    Ok(())
}

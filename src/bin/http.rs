#[cfg(feature = "http_api")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::fs::File;
    use std::net::SocketAddr;

    use log::info;
    use psalm_schedule::{AppConfig, ReadingService, http_api, persistence::open_store};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env();
    let addr: SocketAddr = config.http_addr.parse()?;
    let store = open_store(config.database_path.as_deref())?;
    let service = ReadingService::new(store, config.load_scheduler_config()?);

    if let Some(path) = &config.catalog_csv {
        if service.seed_catalog_csv(File::open(path)?)? {
            info!("seeded psalm catalog from {path}");
        }
    }

    println!("psalm-schedule HTTP API listening on http://{addr}");
    http_api::serve(addr, service).await?;
    Ok(())
}

#[cfg(not(feature = "http_api"))]
fn main() {
    eprintln!("Rebuild with the `http_api` feature to enable the HTTP server.");
}

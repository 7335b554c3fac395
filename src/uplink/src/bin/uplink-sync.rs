use std::path::PathBuf;
use uplink::{Config, GetPackageOptions, PackageResponse, Registry, SyncOptions};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (config_path, package) = match (args.next(), args.next()) {
        (Some(config), Some(package)) => (PathBuf::from(config), package),
        _ => {
            eprintln!("usage: uplink-sync <config.yaml|config.toml> <package> [version|tag]");
            std::process::exit(2);
        }
    };
    let version = args.next();

    let config = Config::from_file(&config_path)?;
    tracing::info!(
        config = %config_path.display(),
        storage = %config.storage.directory,
        "Syncing {} from {} uplink(s)",
        package,
        config.uplinks.len()
    );

    let registry = Registry::new(config)?;
    let options = GetPackageOptions {
        keep_uplink_data: false,
        sync: SyncOptions {
            version,
            ..SyncOptions::default()
        },
    };

    // Ctrl+C aborts in-flight uplink requests
    let cancel = options.sync.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let response = registry.get_package(&package, &options).await?;
    let output = match response {
        PackageResponse::Manifest(manifest) => serde_json::to_string_pretty(&manifest)?,
        PackageResponse::Version(version) => serde_json::to_string_pretty(&version)?,
    };
    println!("{}", output);

    Ok(())
}

use clap::Parser;
use porthole::{ApplicationConfig, entrypoint};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApplicationConfig::parse();
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(ref log_path) = config.log_path {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }
    builder.init();
    entrypoint(config).await
}

use petcare_service::{ServiceConfig, create_app, init_tracing};
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("petcare_service=debug,petcare_flow=debug,tower_http=debug");

    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let app = create_app(&config).await?;
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("PetCare Advisor starting on {}", addr);
    info!("Health check endpoint: http://{}/health", addr);
    info!("Triage endpoint: POST http://{}/api/triage", addr);
    if let Some(dir) = &config.report_dir {
        info!("Saving reports to {}", dir.display());
    }

    axum::serve(listener, app).await?;

    Ok(())
}

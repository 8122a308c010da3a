//! Broker Emulator Service

use broker_emulator::Emulator;
use emu_bootstrap::{BoxError, ServiceParts, run_server};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    run_server("config", |ctx| async move {
        info!("Initializing broker emulator...");

        let emulator = Emulator::new(ctx.config);
        let _background = emulator.spawn_background(ctx.shutdown.clone());

        Ok::<_, BoxError>(ServiceParts {
            grpc: emulator.grpc_routes()?,
            http: emulator.http_router(ctx.shutdown),
            probes: emulator.readiness_probes(),
        })
    })
    .await
}

use clap::Parser;

use easel_collab::admin::{self, AdminState};
use easel_collab::server::{ServerConfig, WhiteboardServer};
use easel_collab::validate::Limits;

/// Real-time collaborative whiteboard server.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// WebSocket bind address
    #[clap(long, default_value = "127.0.0.1:9090")]
    bind: String,

    /// Administrative HTTP bind address
    #[clap(long, default_value = "127.0.0.1:9091")]
    admin_bind: String,

    /// Soft cap on stored events per room
    #[clap(long, default_value_t = 10_000)]
    max_events_per_room: usize,

    /// Minimum gap between accepted CLEAR_CANVAS events, in milliseconds
    #[clap(long, default_value_t = 1_000)]
    clear_cooldown_ms: i64,

    /// Maximum coordinate pairs in a single stroke
    #[clap(long, default_value_t = 1_000)]
    max_points_per_event: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: args.bind,
        admin_addr: args.admin_bind,
        max_events_per_room: args.max_events_per_room,
        clear_cooldown_ms: args.clear_cooldown_ms,
        max_points_per_event: args.max_points_per_event,
        ..ServerConfig::default()
    };

    let server = WhiteboardServer::new(config);

    // The admin surface shares the server's registry and fan-out: one core
    // per process, injected into every entry point.
    let admin_state = AdminState::new(
        server.registry(),
        server.fanout(),
        Limits {
            max_points_per_event: args.max_points_per_event,
        },
    );
    let admin_addr = server.config().admin_addr.clone();
    let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;
    log::info!("admin api listening on {admin_addr}");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(admin_listener, admin::routes(admin_state)).await {
            log::error!("admin server error: {e}");
        }
    });

    server.run().await
}

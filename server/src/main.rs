use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};
use server::broadcast::{decode_update, FanOut};
use server::config::ServerConfig;
use server::queue::command_queue;
use server::scheduler::{run, Scheduler};
use server::utils::timestamp_ms;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Tick length in milliseconds
    #[clap(short, long, default_value = "17")]
    tick_ms: i64,
    /// Snapshots retained per player (publication delay in ticks)
    #[clap(short, long, default_value = "30")]
    window: usize,
    /// Publish a world update every N ticks
    #[clap(short, long, default_value = "10")]
    publish_every: u64,
    /// Capacity of the ingress command queue
    #[clap(short, long, default_value = "16384")]
    queue_capacity: usize,
    /// Updates a peer may leave unread before it starts missing them
    #[clap(long, default_value = "4")]
    peer_buffer: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            tick_interval_ms: args.tick_ms,
            window_depth: args.window,
            publish_every: args.publish_every,
            queue_capacity: args.queue_capacity,
            peer_buffer: args.peer_buffer,
            ..ServerConfig::default()
        }
        .validate()
    }
}

/// Runs the tick loop until Ctrl+C. Transports embed the library and feed it
/// through a `CommandSender`; this host only logs what gets published.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config: ServerConfig = Args::parse().into();
    let (commands, receiver) = command_queue(config.queue_capacity);
    let fanout = FanOut::new(config.peer_buffer);

    let mut subscription = fanout.subscribe();
    tokio::spawn(async move {
        while let Some(bytes) = subscription.updates.recv().await {
            match decode_update(&bytes) {
                Ok(update) => {
                    let tallest = update
                        .player_states
                        .values()
                        .map(|state| {
                            state
                                .field
                                .visible_rows()
                                .iter()
                                .filter(|row| row.iter().any(|cell| !cell.is_empty()))
                                .count()
                        })
                        .max()
                        .unwrap_or(0);
                    debug!(
                        "World update tick {} t={}: {} players, tallest stack {} rows, {} bytes",
                        update.tick,
                        update.time,
                        update.player_states.len(),
                        tallest,
                        bytes.len()
                    );
                }
                Err(e) => warn!("Undecodable world update: {}", e),
            }
        }
    });

    let scheduler = Scheduler::new(config, timestamp_ms());
    info!("No transport attached; commands are accepted through the library API only");

    let scheduler = run(scheduler, receiver, fanout, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    })
    .await;

    drop(commands);
    info!(
        "Shut down after {} ticks at t={}",
        scheduler.tick_count(),
        scheduler.now()
    );
    Ok(())
}

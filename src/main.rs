use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::time::{sleep, timeout, Duration};

use juicebox::adapter::simulated::{RemoteProfile, SimulatedAdapter};
use juicebox::adapter::{self, RadioState};
use juicebox::metadata::{self, ScriptedSource};
use juicebox::{codec, init_logging, Config, DeviceMemory, FileMemory, InMemory, Song};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session against a simulated remote and print what it received.
    Simulate {
        #[arg(long, help = "JSON file overriding timings and thresholds")]
        config: Option<PathBuf>,
        #[arg(long, help = "JSON file remembering the paired remote between runs")]
        memory: Option<PathBuf>,
        #[arg(long, default_value_t = 10, help = "Seconds to wait for each step")]
        wait: u64,
    },
    /// Print the wire line for a song.
    Encode {
        #[arg(long, default_value = "")]
        artist: String,
        #[arg(long, default_value = "")]
        album: String,
        #[arg(long, default_value = "")]
        title: String,
    },
}

#[derive(Serialize)]
struct Summary {
    remote: String,
    state: String,
    last_error: Option<String>,
    writes: usize,
    received: Vec<Song>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            config,
            memory,
            wait,
        } => {
            init_logging();
            let config = match config {
                Some(path) => Config::from_file(path)?,
                None => Config::default(),
            };
            let memory: Box<dyn DeviceMemory> = match memory {
                Some(path) => Box::new(FileMemory::open(path)?),
                None => Box::new(InMemory::new()),
            };
            simulate(config, memory, Duration::from_secs(wait)).await?;
        }
        Commands::Encode {
            artist,
            album,
            title,
        } => {
            let line = codec::encode(&Song::new(artist, album, title));
            print!("{}", String::from_utf8_lossy(&line));
        }
    }
    Ok(())
}

async fn simulate(
    config: Config,
    memory: Box<dyn DeviceMemory>,
    wait: Duration,
) -> anyhow::Result<()> {
    let (events_tx, events_rx) = adapter::channel();
    let profile = RemoteProfile {
        request_on_subscribe: true,
        ..RemoteProfile::default()
    };
    let (sim, remote) = SimulatedAdapter::new(profile, events_tx);
    let (session, task) = juicebox::spawn(sim, events_rx, memory, config);

    let source = ScriptedSource::new([
        Song::new("Daft Punk", "Discovery", "Harder, Better, Faster, Stronger"),
        Song::new("Daft Punk", "Discovery", "Harder, Better, Faster, Stronger"),
        Song::new("Air", "Moon Safari", "La femme d'argent"),
    ]);
    let relay = tokio::spawn(metadata::relay(
        source,
        session.clone(),
        Duration::from_secs(1),
        Duration::from_secs(30),
    ));

    remote.power(RadioState::PoweredOn);
    let ready = timeout(wait, session.wait_for(|s| s.can_send)).await;
    if !matches!(ready, Ok(Some(_))) {
        anyhow::bail!("remote not ready: {}", session.connection_description());
    }
    println!("connected to {}", remote.id());

    sleep(Duration::from_secs(3)).await;
    if remote.request_song() {
        println!("remote asked for the current song");
    }
    sleep(Duration::from_secs(1)).await;

    if remote.drop_link() {
        println!("remote dropped the link");
    }
    let back = timeout(wait, session.wait_for(|s| s.can_send)).await;
    if !matches!(back, Ok(Some(_))) {
        println!("remote did not come back: {}", session.connection_description());
    }
    sleep(Duration::from_secs(1)).await;

    let status = session.status();
    session.shutdown();
    task.await?;
    relay.await?;

    let summary = Summary {
        remote: remote.id().to_string(),
        state: status.description,
        last_error: status.last_error,
        writes: remote.writes().len(),
        received: remote.received(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

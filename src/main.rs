use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use log::{error, info};
use speakercast::config::{self, AppConfig};
use speakercast::decoder::SymphoniaCodec;
use speakercast::encoder::Pcm16Encoder;
use speakercast::udp::{StaticListeners, UdpTransport};
use speakercast::{QueuePos, SessionState, Speaker};

/// Command-line arguments for speakercast
#[derive(Parser, Debug)]
#[command(name = "speakercast")]
#[command(about = "Streams audio tracks to UDP listeners")]
#[command(version)]
struct Args {
    /// Config file to use instead of the platform config directory
    #[arg(short, long, env = "SPEAKERCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Tracks appended to the configured playlist
    tracks: Vec<String>,
}

fn load_config(args: &Args) -> speakercast::Result<AppConfig> {
    match &args.config {
        Some(path) => config::load_from(path),
        None => config::load_or_create(&config::default_config_path()?),
    }
}

async fn run_speaker(args: Args) -> speakercast::Result<()> {
    let config = load_config(&args)?;

    let listeners = StaticListeners::from_config(&config.listeners)?;
    let transport = UdpTransport::bind(&config.bind, listeners.addresses())?;
    info!(
        "sending to {} listeners from {}",
        listeners.peers().len(),
        transport.local_addr()?
    );

    let speaker = Speaker::builder(Arc::new(listeners), Arc::new(transport))
        .config(config.speaker.clone())
        .codec(Arc::new(SymphoniaCodec))
        .encoder(Box::new(Pcm16Encoder))
        .build()?;

    for track in config.playlist.iter().chain(args.tracks.iter()) {
        speaker.enqueue(track.clone(), None)?;
    }
    speaker.play(QueuePos::Index(0))?;

    let mut interval = tokio::time::interval(Duration::from_millis(config.tick_ms.max(1)));
    let mut last = tokio::time::Instant::now();
    let mut started = false;
    loop {
        interval.tick().await;
        let now = tokio::time::Instant::now();
        speaker.tick(now - last);
        last = now;

        let state = speaker.state();
        if state.is_active() {
            started = true;
        } else if started || state == SessionState::Destroyed {
            break;
        }
    }

    info!("{}", serde_json::to_string(&speaker.status())?);
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if let Err(err) = run_speaker(args).await {
        error!("{}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;

    use super::Args;

    #[test]
    fn config_flag_and_tracks() {
        let args = Args::try_parse_from(["speakercast", "a.ogg", "--config", "/tmp/c.json", "b.ogg"])
            .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.json")));
        assert_eq!(args.tracks, vec!["a.ogg".to_string(), "b.ogg".to_string()]);
    }

    #[test]
    fn config_flag_needs_a_value() {
        assert!(Args::try_parse_from(["speakercast", "--config"]).is_err());
    }
}

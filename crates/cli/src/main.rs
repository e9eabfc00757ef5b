use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use api::ApiClient;
use chrono::Utc;
use clap::{Parser, Subcommand};
use feed::{format_count, relative_age, LikeId, RelativeAge};
use player::{NetworkHints, PlayerConfig};
use tracing_subscriber::EnvFilter;

mod simulate;

#[derive(Parser)]
#[command(name = "tingtong-cli", version, about = "Vertical video feed client and playback simulator")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, global = true)]
    verbose: bool,
    #[arg(long, global = true, default_value = "http://localhost/wp-admin/admin-ajax.php")]
    endpoint: String,
    #[arg(long, global = true, default_value = "")]
    nonce: String,
    /// Player config JSON; defaults to the per-user config file when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the slide feed.
    Slides,
    /// Toggle the like on a post.
    Like { post_id: String },
    /// List a post's comments.
    Comments { post_id: String },
    /// Add a comment to a post.
    Comment { post_id: String, text: String },
    Login {
        user: String,
        #[arg(long)]
        password: String,
    },
    Logout,
    /// Drive the headless playback controller from a script.
    Simulate {
        /// Feed payload: a slide list or `{"slides": [...]}`.
        feed: PathBuf,
        script: PathBuf,
        #[arg(long, default_value_t = 800.0)]
        view_height: f64,
        #[arg(long)]
        logged_in: bool,
        #[arg(long, default_value_t = 30)]
        engine_latency_ms: u64,
        #[arg(long)]
        native_hls: bool,
        #[arg(long)]
        block_autoplay: bool,
        /// Behave as if the user asked for reduced data usage.
        #[arg(long)]
        save_data: bool,
        /// Reported connection class, e.g. `4g`, `3g`, `slow-2g`.
        #[arg(long)]
        effective_type: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Simulate {
            feed,
            script,
            view_height,
            logged_in,
            engine_latency_ms,
            native_hls,
            block_autoplay,
            save_data,
            effective_type,
        } => {
            let hints = NetworkHints { save_data, effective_type };
            let config = simulation_config(cli.config.as_deref(), &hints)?;
            let opts = simulate::SimOptions {
                feed,
                script,
                view_height,
                logged_in,
                engine_latency: Duration::from_millis(engine_latency_ms),
                native_hls,
                block_autoplay,
                config,
            };
            let summary = tokio::task::spawn_blocking(move || simulate::run(opts)).await??;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        remote => {
            let client = ApiClient::new(&cli.endpoint, cli.nonce).context("building api client")?;
            run_remote(&client, remote).await
        }
    }
}

fn simulation_config(path: Option<&Path>, hints: &NetworkHints) -> Result<PlayerConfig> {
    let mut config = PlayerConfig::load_or_default(path).context("loading player config")?;
    config.apply_network_hints(hints);
    Ok(config)
}

async fn run_remote(client: &ApiClient, command: Command) -> Result<()> {
    match command {
        Command::Slides => {
            let feed = client.slides().await.context("fetching slides")?;
            for s in feed.iter() {
                let hls = if s.media.stream_url.is_some() { " hls" } else { "" };
                println!(
                    "{:>3} {:<6} @{:<16} {:>6} likes {:>5} comments [{:?}{hls}] {}",
                    s.index,
                    s.like_id.as_str(),
                    s.author,
                    format_count(s.counters.likes),
                    format_count(s.counters.comments),
                    s.access,
                    s.description
                );
            }
        }
        Command::Like { post_id } => {
            let t = client.toggle_like(&LikeId::new(post_id)).await.context("toggling like")?;
            println!("{:?} ({})", t.status, format_count(t.count));
        }
        Command::Comments { post_id } => {
            let now = Utc::now();
            for c in client.comments(&LikeId::new(post_id)).await.context("fetching comments")? {
                let age = match relative_age(c.timestamp, now) {
                    RelativeAge::Seconds(n) => format!("{n}s"),
                    RelativeAge::Minutes(n) => format!("{n}m"),
                    RelativeAge::Hours(n) => format!("{n}h"),
                    RelativeAge::Days(n) => format!("{n}d"),
                };
                let own = if c.is_own_comment { " (you)" } else { "" };
                println!("{:>4} ago  {}{own}: {}", age, c.author, c.text);
            }
        }
        Command::Comment { post_id, text } => {
            let text = text.trim();
            anyhow::ensure!(!text.is_empty(), "comment text is empty");
            let count = client.add_comment(&LikeId::new(post_id), text).await.context("adding comment")?;
            println!("comments: {}", format_count(count));
        }
        Command::Login { user, password } => {
            let reply = client.login(&user, &password).await.context("logging in")?;
            println!("{} (nonce {})", reply.message, client.nonce());
            anyhow::ensure!(reply.success, "login refused");
        }
        Command::Logout => {
            let reply = client.logout().await.context("logging out")?;
            println!("{}", reply.message);
        }
        Command::Simulate { .. } => anyhow::bail!("simulate does not talk to the server"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_flags_reach_the_player_config() {
        let cli = Cli::parse_from(["tingtong-cli", "simulate", "f.json", "s.txt", "--save-data", "--effective-type", "3g"]);
        let Command::Simulate { save_data, effective_type, .. } = cli.command else { panic!("expected simulate") };
        let dir = std::env::temp_dir().join(format!("tingtong-cli-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("player.json");
        std::fs::write(&path, "{}").unwrap();
        let config = simulation_config(Some(&path), &NetworkHints { save_data, effective_type }).unwrap();
        assert!(config.low_data_mode);
        assert_eq!(config.engine.max_auto_level_capping, Some(480));
        assert!(config.unloads_far_slides());
    }
}

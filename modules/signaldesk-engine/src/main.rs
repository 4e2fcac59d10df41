use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use audit_client::AuditClient;
use signaldesk_common::Config;
use signaldesk_engine::dashboard::{Command, Dashboard, USAGE};
use signaldesk_engine::session::FileSession;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("signaldesk=info".parse()?)
                .add_directive("audit_client=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("SignalDesk starting...");

    let config = Config::from_env()?;
    let client = AuditClient::new(&config.api_url);
    let session = FileSession::open(&config.session_path);

    let mut dashboard = Dashboard::start(
        client,
        config.reveal.clone(),
        Box::new(session),
        Box::new(std::io::stdout()),
    )
    .await?;
    println!("{USAGE}");

    let (tx, rx) = mpsc::channel(16);

    // Stdin reader
    let stdin_tx = tx.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match line.parse::<Command>() {
                    Ok(command) => {
                        if stdin_tx.send(command).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => eprintln!("{e}\n{USAGE}"),
                },
                Ok(None) => {
                    let _ = stdin_tx.send(Command::Quit).await;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin");
                    break;
                }
            }
        }
    });

    // Ctrl-C quits cleanly so timers are cancelled and the session flushed.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Command::Quit).await;
        }
    });

    dashboard.run(rx).await?;
    drop(dashboard.teardown());

    info!("SignalDesk stopped");
    Ok(())
}

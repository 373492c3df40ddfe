//! Joins a Tally room and prints its phase, votes and timer as they
//! change.
//!
//! ```text
//! TALLY_URL=ws://127.0.0.1:8080 TALLY_ROOM=sprint-42 TALLY_USER=watcher \
//!     cargo run -p room-watch
//! ```

use std::env;

use tally::prelude::*;
use tally::timer::TimerTicker;
use tokio::sync::mpsc;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn render(view: &RoomView) {
    let stats = &view.stats;
    let average = stats
        .average
        .map_or_else(|| "-".to_string(), |avg| format!("{avg:.1}"));
    let mode = stats
        .mode
        .as_ref()
        .map_or("-", |value| value.as_str());
    let timer = view
        .timer
        .map_or_else(|| "--:--".to_string(), |t| t.remaining_clock());
    println!(
        "[{}] {}/{} voted | avg {average} | mode {mode} | {timer}",
        view.phase, stats.voted_users, stats.total_users,
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tally::logging::init();

    let url = env_or("TALLY_URL", "ws://127.0.0.1:8080");
    let room = env_or("TALLY_ROOM", "demo");
    let user = env_or("TALLY_USER", "room-watch");

    let mut client = TallyClient::builder()
        .server_url(&url)
        .user(&user)
        .build()?;

    let (tx, mut events) = mpsc::unbounded_channel();
    client
        .join(room.as_str(), move |event: &ConnectionEvent| {
            let _ = tx.send(event.clone());
        })
        .await?;
    tracing::info!(%url, %room, %user, "watching room");

    let mut ticker = TimerTicker::every_second();
    let no_timer = TimerState::default();

    loop {
        let timer_state = client
            .room()
            .snapshot()
            .and_then(|snapshot| snapshot.timer_state)
            .unwrap_or(no_timer);

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => {
                let Some(event) = event else { break };
                match &event {
                    ConnectionEvent::Message(
                        ServerMessage::InitialState { .. } | ServerMessage::RoomUpdate { .. },
                    ) => {
                        if let Some(view) = client.room().view(&SystemClock) {
                            render(&view);
                        }
                    }
                    ConnectionEvent::Message(_) => {}
                    ConnectionEvent::Disconnected { reason } => {
                        eprintln!("disconnected: {reason}");
                        break;
                    }
                    other => tracing::info!(event = ?other, "connection"),
                }
            }
            view = ticker.tick(&timer_state, &SystemClock), if timer_state.running => {
                println!("timer {} remaining", view.remaining_clock());
            }
        }
    }

    client.leave().await;
    Ok(())
}

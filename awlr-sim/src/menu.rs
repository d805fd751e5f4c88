use std::io::{BufRead, Write};
use std::str::FromStr;

use rand::Rng;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::publisher::{PublishError, PublishReport};
use crate::simulator::Simulator;
use crate::transport::Transport;

/// One parsed line of menu input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    /// Zero-based registry index; the menu shows it one-based.
    Device(usize),
    All,
    Reconnect,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MenuError {
    #[error("empty input")]
    Empty,
    #[error("invalid input '{0}', please enter a number")]
    NotANumber(String),
}

impl FromStr for MenuChoice {
    type Err = MenuError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let token = input.trim();
        if token.is_empty() {
            return Err(MenuError::Empty);
        }
        if token.eq_ignore_ascii_case("a") {
            return Ok(MenuChoice::All);
        }
        if token.eq_ignore_ascii_case("r") {
            return Ok(MenuChoice::Reconnect);
        }

        match token.parse::<usize>() {
            Ok(0) => Ok(MenuChoice::Exit),
            Ok(n) => Ok(MenuChoice::Device(n - 1)),
            Err(_) => Err(MenuError::NotANumber(token.to_owned())),
        }
    }
}

/// How the command loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The operator chose exit.
    Requested,
    /// Input reached end of file.
    InputClosed,
    /// The cancellation token fired.
    Interrupted,
}

/// Forward lines from a blocking reader over a channel.
///
/// The read runs on a detached OS thread so a pending read never holds up
/// runtime shutdown. The channel closes at end of input, on a read error, or
/// once the receiver is dropped and the next line arrives.
pub fn spawn_line_reader<B>(reader: B) -> std::io::Result<mpsc::Receiver<String>>
where
    B: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("menu-input".into())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read menu input");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Read menu selections from `input` until exit, end of input or
/// cancellation, writing the menu and results to `out`.
///
/// Does not disconnect; the caller owns teardown so it runs on every exit
/// path including I/O errors.
pub async fn run_command_loop<T, R, W>(
    sim: &mut Simulator<T, R>,
    mut input: mpsc::Receiver<String>,
    out: &mut W,
    cancel: CancellationToken,
) -> std::io::Result<LoopExit>
where
    T: Transport,
    R: Rng,
    W: Write,
{
    let debug = sim.settings().debug;

    loop {
        write!(out, "\n{}", sim.render_menu())?;
        write!(out, "Select Device: ")?;
        out.flush()?;

        let line = tokio::select! {
            _ = cancel.cancelled() => {
                writeln!(out, "\n\nInterrupted by user.")?;
                return Ok(LoopExit::Interrupted);
            }
            line = input.recv() => line,
        };
        let Some(line) = line else {
            info!("Input closed");
            return Ok(LoopExit::InputClosed);
        };

        match line.parse::<MenuChoice>() {
            Ok(MenuChoice::Exit) => {
                writeln!(out, "\nExiting...")?;
                return Ok(LoopExit::Requested);
            }
            Ok(MenuChoice::Reconnect) => {
                writeln!(out, "\nReconnecting...")?;
                match sim.reconnect().await {
                    Ok(()) => writeln!(out, "[OK] Reconnected")?,
                    Err(e) => writeln!(out, "[ERROR] Reconnect failed: {e}")?,
                }
            }
            Ok(MenuChoice::All) => {
                writeln!(out, "\n[SEND] Sending to all devices...")?;
                for result in sim.publish_all().await {
                    report(out, result, debug)?;
                }
                writeln!(out, "\n[OK] Sent to all devices!")?;
            }
            Ok(MenuChoice::Device(index)) => {
                let result = sim.publish(index).await;
                report(out, result, debug)?;
            }
            Err(e) => {
                warn!(error = %e, "Rejected menu input");
                writeln!(out, "[ERROR] {e}")?;
            }
        }
    }
}

fn report<W: Write>(
    out: &mut W,
    result: Result<PublishReport, PublishError>,
    debug: bool,
) -> std::io::Result<()> {
    match result {
        Ok(report) => write!(out, "\n{}", report.render(debug)),
        Err(PublishError::NotConnected) => {
            writeln!(out, "[ERROR] MQTT not connected! Use 'R' to reconnect.")
        }
        Err(e) => writeln!(out, "[ERROR] {e}"),
    }
}

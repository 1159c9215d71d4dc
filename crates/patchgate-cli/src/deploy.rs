//! Operator input for the deploy wait
//!
//! A line on the input confirms the deploy. End of input or Ctrl-C
//! interrupts it. Whichever comes first fills the single-slot channel.

use patchgate_core::{listener_from, DeployListener, DeploySignal};
use std::io::BufRead;

/// Listener reading the confirmation line from `input`
///
/// The reader runs on its own thread so a run that finishes while it is
/// still blocked does not hold up process exit.
pub fn line_listener<R>(input: R, watch_ctrl_c: bool) -> DeployListener
where
    R: BufRead + Send + 'static,
{
    listener_from(move |tx| {
        let lines = tx.clone();
        std::thread::spawn(move || {
            let signal = read_signal(input);
            tracing::debug!(?signal, "deploy input");
            // The coordinator may already have an answer.
            let _ = lines.blocking_send(signal);
        });

        if watch_ctrl_c {
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    let _ = tx.send(DeploySignal::Interrupted).await;
                }
            });
        }
    })
}

/// Listener on the process stdin with Ctrl-C handling
#[must_use]
pub fn stdin_listener() -> DeployListener {
    line_listener(std::io::BufReader::new(std::io::stdin()), true)
}

fn read_signal(mut input: impl BufRead) -> DeploySignal {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => DeploySignal::Interrupted,
        Ok(_) => DeploySignal::Confirmed,
    }
}

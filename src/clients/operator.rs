//! Human-in-the-loop callback for manual-action stores.

use async_trait::async_trait;
use std::io::IsTerminal;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::errors::{Error, Result};
use crate::secrets::SecretString;

/// A step an operator must perform by hand.
#[derive(Debug)]
pub struct OperatorRequest<'a> {
    pub store: &'a str,
    pub message: &'a str,
    /// New value to show the operator exactly once, if any
    pub value: Option<&'a SecretString>,
}

#[async_trait]
pub trait OperatorPrompt: Send + Sync {
    /// Whether a person is available to answer prompts. Runs without one
    /// are treated as unattended.
    fn is_interactive(&self) -> bool;

    /// Present the request and wait until the operator confirms.
    async fn prompt(&self, request: OperatorRequest<'_>) -> Result<()>;
}

/// Prompts on stderr and waits for Enter on stdin.
///
/// Only interactive when stdin is a terminal. End of input is never taken
/// as a confirmation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

#[async_trait]
impl OperatorPrompt for ConsolePrompt {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    async fn prompt(&self, request: OperatorRequest<'_>) -> Result<()> {
        eprintln!();
        eprintln!("[{}] {}", request.store, request.message);
        if let Some(value) = request.value {
            // Shown once; the value is not kept anywhere after this
            eprintln!("New value: {}", value.expose_secret());
        }
        eprintln!("Press Enter once done...");

        read_confirmation(BufReader::new(tokio::io::stdin()), request.store).await
    }
}

/// Wait for one line of input. Closed input is an error.
async fn read_confirmation<R>(mut reader: R, store: &str) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .await
        .map_err(|e| Error::io(e, "Failed to read operator confirmation"))?;
    if read == 0 {
        return Err(Error::config(format!(
            "Operator confirmation for store '{}' not received: input closed",
            store
        )));
    }
    Ok(())
}

/// Used for unattended runs: every prompt fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnattendedPrompt;

#[async_trait]
impl OperatorPrompt for UnattendedPrompt {
    fn is_interactive(&self) -> bool {
        false
    }

    async fn prompt(&self, request: OperatorRequest<'_>) -> Result<()> {
        Err(Error::config(format!(
            "Store '{}' requires an operator but the run is unattended",
            request.store
        )))
    }
}

//! Terminal input shared between feed names and the authorization prompt.
//!
//! stdin has exactly one reader, a dedicated thread feeding a [`LineRouter`].
//! Each line goes to the authorization prompt if one is waiting for a
//! redirect URL, and to the feed-name channel otherwise. A token refresh in
//! the middle of an interactive session therefore never races the
//! feed-name loop for the pasted URL.
use crate::auth::{extract_code, AuthError, CodePrompt};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::BufRead;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use url::Url;

#[derive(Debug, Default)]
struct PromptSlot {
    waiting: Option<oneshot::Sender<String>>,
    closed: bool,
}

/// Hands each input line to a waiting prompt, or back to the caller.
#[derive(Debug, Default)]
pub struct LineRouter {
    slot: Mutex<PromptSlot>,
}

impl LineRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `line` to the waiting prompt, if any.
    ///
    /// Returns the line when no prompt claimed it.
    pub fn dispatch(&self, line: String) -> Option<String> {
        let waiting = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .waiting
            .take();

        match waiting {
            // A prompt that gave up in the meantime hands the line back
            Some(tx) => tx.send(line).err(),
            None => Some(line),
        }
    }

    /// Mark input as exhausted; waiting and future prompts fail.
    pub fn close(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.closed = true;
        slot.waiting = None;
    }

    /// Wait for the next line of input.
    pub async fn next_prompt_line(&self) -> Result<String, AuthError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.closed {
                return Err(AuthError::Prompt("input closed".to_string()));
            }
            slot.waiting = Some(tx);
        }
        rx.await
            .map_err(|_| AuthError::Prompt("input closed before a redirect URL was entered".to_string()))
    }

    /// Read stdin on a dedicated thread, routing every line through `self`.
    ///
    /// Lines no prompt claimed arrive on the returned channel, which closes
    /// at end of input.
    pub fn spawn_stdin(self: &Arc<Self>) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Arc::clone(self);

        std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if let Some(line) = router.dispatch(line) {
                            // Receiver gone: keep serving prompts
                            let _ = tx.send(line);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
            router.close();
        });

        rx
    }
}

/// Sends the user to the authorize page and reads the redirect back.
pub struct TerminalPrompt {
    input: Arc<LineRouter>,
    open_browser: bool,
}

impl TerminalPrompt {
    pub fn new(input: Arc<LineRouter>) -> Self {
        Self {
            input,
            open_browser: true,
        }
    }

    /// Only print the URL.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }
}

impl CodePrompt for TerminalPrompt {
    fn authorization_code<'a>(
        &'a self,
        authorize_url: &'a Url,
    ) -> BoxFuture<'a, Result<String, AuthError>> {
        async move {
            eprintln!("Please visit the following URL to authorize subtally:");
            eprintln!();
            eprintln!("  {authorize_url}");
            eprintln!();

            // Only hand web URLs to the system opener
            if self.open_browser && matches!(authorize_url.scheme(), "https" | "http") {
                if let Err(e) = open::that(authorize_url.as_str()) {
                    tracing::debug!(error = %e, "Could not open browser");
                }
            }

            eprintln!("After approving, paste the URL you were redirected to:");
            let line = self.input.next_prompt_line().await?;
            if line.trim().is_empty() {
                return Err(AuthError::Prompt("no redirect URL entered".to_string()));
            }
            extract_code(&line)
        }
        .boxed()
    }
}

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};

use chrono::Utc;

use super::{ListingClient, ListingSnapshot, ListingSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    RefreshNow,
    Stop,
}

/// Background thread running the refresh chain; one fetch is in flight at most.
///
/// Dropping the worker stops the chain and joins the thread.
pub(crate) struct ListingWorker {
    control_tx: mpsc::Sender<Control>,
    join_handle: Option<JoinHandle<()>>,
}

impl ListingWorker {
    pub(crate) fn spawn<S>(client: ListingClient<S>, updates: mpsc::Sender<ListingSnapshot>) -> Self
    where
        S: ListingSource + Send + 'static,
    {
        let (control_tx, control_rx) = mpsc::channel();
        let join_handle = thread::spawn(move || run_refresh_loop(client, &updates, &control_rx));
        Self {
            control_tx,
            join_handle: Some(join_handle),
        }
    }

    /// Cuts the current wait short and refreshes right away.
    pub(crate) fn refresh_now(&self) {
        let _ = self.control_tx.send(Control::RefreshNow);
    }

    pub(crate) fn stop(&mut self) {
        let _ = self.control_tx.send(Control::Stop);
        if let Some(handle) = self.join_handle.take()
            && handle.join().is_err()
        {
            tracing::error!("listing refresh thread panicked");
        }
    }
}

impl Drop for ListingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_refresh_loop<S: ListingSource>(
    mut client: ListingClient<S>,
    updates: &mpsc::Sender<ListingSnapshot>,
    control_rx: &mpsc::Receiver<Control>,
) {
    loop {
        let delay = client.refresh(Utc::now());
        if updates.send(client.snapshot().clone()).is_err() {
            tracing::debug!("listing receiver dropped, stopping refresh chain");
            return;
        }

        match control_rx.recv_timeout(delay) {
            Ok(Control::RefreshNow) => {
                // Collapse repeated requests into one refresh.
                let mut stop = false;
                while let Ok(control) = control_rx.try_recv() {
                    stop |= control == Control::Stop;
                }
                if stop {
                    break;
                }
                tracing::debug!("manual listing refresh requested");
            }
            Err(RecvTimeoutError::Timeout) => {}
            Ok(Control::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!("listing refresh chain stopped");
}

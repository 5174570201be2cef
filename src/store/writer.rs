use std::io;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

type Reply = oneshot::Sender<io::Result<()>>;

pub(super) enum WalCommand {
    Append { event: Event, response: Reply },
    Rewrite { events: Vec<Event>, response: Reply },
    AppendsSinceCompact { response: oneshot::Sender<u64> },
}

/// Owns the WAL for the lifetime of a store.
///
/// Every wake-up drains whatever is already queued. Appends in that batch
/// share one fsync; a control command first commits the appends queued
/// ahead of it so ordering is preserved.
pub(super) async fn run_writer(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    let mut batch: Vec<(Event, Reply)> = Vec::new();
    while let Some(first) = rx.recv().await {
        let mut next = Some(first);
        while let Some(cmd) = next.take() {
            match cmd {
                WalCommand::Append { event, response } => batch.push((event, response)),
                control => {
                    commit(&mut wal, &mut batch);
                    handle_control(&mut wal, control);
                }
            }
            next = rx.try_recv().ok();
        }
        commit(&mut wal, &mut batch);
    }
    tracing::debug!(path = %wal.path().display(), "WAL writer stopped");
}

fn commit(wal: &mut Wal, batch: &mut Vec<(Event, Reply)>) {
    if batch.is_empty() {
        return;
    }
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = Instant::now();

    let result = wal.commit(batch.iter().map(|(event, _)| event));

    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(error = %e, batch = batch.len(), "WAL commit failed");
    }
    for (_, response) in batch.drain(..) {
        let reply = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = response.send(reply);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Rewrite { events, response } => {
            let _ = response.send(wal.rewrite(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

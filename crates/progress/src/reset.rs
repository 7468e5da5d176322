use crate::writer::ProgressWriter;
use bkctl_core::SolveStatus;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;

/// Rebase engine timestamps onto the moment this handle was created.
///
/// The offset is taken from the first vertex that reports a start time and
/// then applied to every timestamp that follows, so durations are unchanged
/// while a session reused from an earlier build does not show stale times.
#[must_use]
pub fn reset_time(writer: ProgressWriter) -> ProgressWriter {
    let (tx, mut rx) = mpsc::unbounded_channel::<SolveStatus>();
    let (primary, completion) = writer.into_parts();
    let created = Utc::now();

    tokio::spawn(async move {
        let mut offset: Option<Duration> = None;
        while let Some(mut status) = rx.recv().await {
            if offset.is_none() {
                offset = status
                    .vertexes
                    .iter()
                    .filter_map(|v| v.started)
                    .last()
                    .map(|started| started - created);
            }
            if let Some(offset) = offset {
                shift(&mut status, offset);
            }
            if primary.send(status).is_err() {
                break;
            }
        }
    });

    ProgressWriter::new(tx, completion)
}

fn shift(status: &mut SolveStatus, offset: Duration) {
    let rebase = |t: &mut Option<DateTime<Utc>>| {
        if let Some(t) = t {
            *t -= offset;
        }
    };
    for vertex in &mut status.vertexes {
        rebase(&mut vertex.started);
        rebase(&mut vertex.completed);
    }
    for vs in &mut status.statuses {
        vs.timestamp -= offset;
        rebase(&mut vs.started);
        rebase(&mut vs.completed);
    }
    for log in &mut status.logs {
        log.timestamp -= offset;
    }
}

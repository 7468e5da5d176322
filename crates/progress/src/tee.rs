use crate::writer::ProgressWriter;
use bkctl_core::{SolveStatus, StatusSender};
use tokio::sync::mpsc;

/// Duplicate everything written to `writer` into `copy`.
///
/// Each record reaches `copy` and then `writer`, one record at a time, so
/// both observe the same order. When the returned handle is closed both
/// destinations are closed. A destination that stopped accepting input is
/// skipped; its own completion or task reports why.
#[must_use]
pub fn tee(writer: ProgressWriter, copy: StatusSender) -> ProgressWriter {
    let (tx, mut rx) = mpsc::unbounded_channel::<SolveStatus>();
    let (primary, completion) = writer.into_parts();

    tokio::spawn(async move {
        while let Some(status) = rx.recv().await {
            let _ = copy.send(status.clone());
            let _ = primary.send(status);
        }
    });

    ProgressWriter::new(tx, completion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::testing::{collecting, named};

    #[tokio::test]
    async fn test_tee_duplicates_in_order() {
        let (writer, seen) = collecting();
        let (copy_tx, mut copy_rx) = mpsc::unbounded_channel();

        let teed = tee(writer, copy_tx);
        let completion = teed.completion();
        for name in ["a", "b", "c"] {
            teed.send(named(name));
        }
        teed.close();
        completion.wait().await.unwrap();

        let mut copied = Vec::new();
        while let Some(status) = copy_rx.recv().await {
            copied.push(status.vertexes[0].name.clone());
        }
        let displayed: Vec<String> = seen
            .lock()
            .await
            .iter()
            .map(|s| s.vertexes[0].name.clone())
            .collect();

        assert_eq!(copied, vec!["a", "b", "c"]);
        assert_eq!(displayed, copied);
    }

    #[tokio::test]
    async fn test_tee_survives_closed_copy() {
        let (writer, seen) = collecting();
        let (copy_tx, copy_rx) = mpsc::unbounded_channel();
        drop(copy_rx);

        let teed = tee(writer, copy_tx);
        let completion = teed.completion();
        teed.send(named("a"));
        teed.close();
        completion.wait().await.unwrap();

        assert_eq!(seen.lock().await.len(), 1);
    }
}

use crate::writer::{Completion, ProgressWriter};
use bkctl_core::{SolveStatus, StatusSender};
use tokio::sync::mpsc;

/// Fans several independent writer handles into one sink.
///
/// Each handle gets its own forwarding task, so records from one handle keep
/// their order. The sink is closed once the `MultiWriter` itself and every
/// handle created from it have been dropped, which is what makes the sink's
/// completion the completion of the whole group.
#[derive(Debug)]
pub struct MultiWriter {
    primary: StatusSender,
    completion: Completion,
}

impl MultiWriter {
    #[must_use]
    pub fn new(writer: ProgressWriter) -> Self {
        let (primary, completion) = writer.into_parts();
        Self {
            primary,
            completion,
        }
    }

    /// Create a handle whose vertex names are prefixed with `[prefix]`.
    ///
    /// An empty prefix forwards records untouched. Without `force`, vertices
    /// that already carry a bracketed prefix keep their name.
    #[must_use]
    pub fn with_prefix(&self, prefix: &str, force: bool) -> ProgressWriter {
        let (tx, mut rx) = mpsc::unbounded_channel::<SolveStatus>();
        let primary = self.primary.clone();
        let prefix = prefix.to_string();

        tokio::spawn(async move {
            while let Some(mut status) = rx.recv().await {
                if !prefix.is_empty() {
                    for vertex in &mut status.vertexes {
                        if force || !vertex.name.starts_with('[') {
                            vertex.name = add_prefix(&prefix, &vertex.name);
                        }
                    }
                }
                if primary.send(status).is_err() {
                    break;
                }
            }
        });

        ProgressWriter::new(tx, self.completion.clone())
    }

    /// Completion of the shared sink
    #[must_use]
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }
}

fn add_prefix(prefix: &str, name: &str) -> String {
    match name.strip_prefix('[') {
        Some(rest) => format!("[{prefix} {rest}"),
        None => format!("[{prefix}] {name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::testing::{collecting, named};
    use proptest::prelude::*;

    #[test]
    fn test_add_prefix() {
        assert_eq!(add_prefix("auth", "fetch token"), "[auth] fetch token");
        assert_eq!(add_prefix("auth", "[1/3] RUN make"), "[auth 1/3] RUN make");
    }

    #[tokio::test]
    async fn test_sink_closes_after_every_handle() {
        let (writer, seen) = collecting();
        let multi = MultiWriter::new(writer);
        let completion = multi.completion();

        let first = multi.with_prefix("", false);
        let second = multi.with_prefix("", false);
        drop(multi);

        first.send(named("a"));
        first.close();
        tokio::task::yield_now().await;
        assert!(!completion.is_done());

        second.send(named("b"));
        second.close();
        completion.wait().await.unwrap();

        assert_eq!(seen.lock().await.len(), 2);
    }

    #[tokio::test]
    async fn test_prefix_is_applied() {
        let (writer, seen) = collecting();
        let multi = MultiWriter::new(writer);
        let completion = multi.completion();

        let prefixed = multi.with_prefix("ssh", false);
        let forced = multi.with_prefix("ssh", true);
        drop(multi);

        prefixed.send(named("[1/2] dial"));
        prefixed.close();
        forced.send(named("[2/2] dial"));
        forced.close();
        completion.wait().await.unwrap();

        let mut names: Vec<String> = seen
            .lock()
            .await
            .iter()
            .map(|s| s.vertexes[0].name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["[1/2] dial", "[ssh 2/2] dial"]);
    }

    proptest! {
        #[test]
        fn proptest_handles_preserve_emission_order(
            streams in proptest::collection::vec(proptest::collection::vec(0u16..1000, 0..20), 1..4)
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let (writer, seen) = collecting();
                let multi = MultiWriter::new(writer);
                let completion = multi.completion();
                let handles: Vec<ProgressWriter> =
                    streams.iter().map(|_| multi.with_prefix("", false)).collect();
                drop(multi);

                for (idx, (handle, stream)) in handles.into_iter().zip(&streams).enumerate() {
                    for value in stream {
                        handle.send(named(&format!("{idx}-{value}")));
                    }
                    handle.close();
                }
                completion.wait().await.unwrap();

                let seen = seen.lock().await;
                for (idx, stream) in streams.iter().enumerate() {
                    let prefix = format!("{idx}-");
                    let received: Vec<String> = seen
                        .iter()
                        .map(|s| s.vertexes[0].name.clone())
                        .filter(|name| name.starts_with(&prefix))
                        .collect();
                    let expected: Vec<String> =
                        stream.iter().map(|value| format!("{idx}-{value}")).collect();
                    assert_eq!(received, expected);
                }
            });
        }
    }
}

use bkctl_core::{Error, Result, SolveStatus, StatusSender};
use tokio::sync::{mpsc, watch};

/// Terminal state of a sink
#[derive(Debug, Clone)]
enum Outcome {
    Finished,
    Failed { sink: String, message: String },
}

/// Lifecycle signal of a sink: resolves once the sink has stopped and
/// remembers why it stopped.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<Outcome>>,
}

/// Producer side of a [`Completion`], owned by the task driving the sink
#[derive(Debug)]
pub(crate) struct CompletionSender {
    tx: watch::Sender<Option<Outcome>>,
}

impl Completion {
    pub(crate) fn channel() -> (CompletionSender, Completion) {
        let (tx, rx) = watch::channel(None);
        (CompletionSender { tx }, Completion { rx })
    }

    /// Wait until the sink has stopped, successfully or not
    pub async fn done(&self) {
        let mut rx = self.rx.clone();
        // An Err here means the driving task went away without reporting,
        // which `err` surfaces.
        let _ = rx.wait_for(Option::is_some).await;
    }

    #[must_use]
    pub fn is_done(&self) -> bool {
        self.rx.borrow().is_some() || self.rx.has_changed().is_err()
    }

    /// The error the sink stopped with, if any
    #[must_use]
    pub fn err(&self) -> Option<Error> {
        match &*self.rx.borrow() {
            Some(Outcome::Finished) => None,
            Some(Outcome::Failed { sink, message }) => Some(Error::sink(sink, message)),
            None if self.rx.has_changed().is_err() => Some(Error::internal(
                "progress sink stopped without reporting completion",
            )),
            None => None,
        }
    }

    /// Wait for the sink and turn its outcome into a result
    pub async fn wait(&self) -> Result<()> {
        self.done().await;
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl CompletionSender {
    pub(crate) fn finish(self, result: Result<()>) {
        let outcome = match result {
            Ok(()) => Outcome::Finished,
            Err(Error::Sink { sink, message }) => Outcome::Failed { sink, message },
            Err(other) => Outcome::Failed {
                sink: "progress".to_string(),
                message: other.to_string(),
            },
        };
        self.tx.send_replace(Some(outcome));
    }
}

/// Handle to a sink: the input side for status records plus its completion.
///
/// Closing the handle (dropping it, or [`ProgressWriter::close`]) tells the
/// sink no more records follow.
#[derive(Debug)]
pub struct ProgressWriter {
    status: StatusSender,
    completion: Completion,
}

impl ProgressWriter {
    pub(crate) fn new(status: StatusSender, completion: Completion) -> Self {
        Self { status, completion }
    }

    /// Input side for status records
    #[must_use]
    pub fn status(&self) -> &StatusSender {
        &self.status
    }

    /// Forward one record; returns false once the sink no longer accepts input
    pub fn send(&self, status: SolveStatus) -> bool {
        self.status.send(status).is_ok()
    }

    #[must_use]
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Split into the input side and the completion signal
    #[must_use]
    pub fn into_parts(self) -> (StatusSender, Completion) {
        (self.status, self.completion)
    }

    /// Close the input side
    pub fn close(self) {
        drop(self.status);
    }
}

/// A sink that accepts and drops every record
#[must_use]
pub fn discard() -> ProgressWriter {
    let (tx, mut rx) = mpsc::unbounded_channel::<SolveStatus>();
    let (done, completion) = Completion::channel();
    tokio::spawn(async move {
        while rx.recv().await.is_some() {}
        done.finish(Ok(()));
    });
    ProgressWriter::new(tx, completion)
}

//! Source list loading and the producer feeding the fetch stage.

use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info_span, Instrument};

use crate::cancellation::CancellationObserver;
use crate::core::Source;
use crate::errors::DocflowError;

/// Parses a line-delimited source list.
///
/// Surrounding whitespace is trimmed; blank lines and `#` comments are skipped.
#[must_use]
pub fn parse_source_list(text: &str) -> Vec<Source> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Source::new)
        .collect()
}

/// Reads a source list file.
///
/// # Errors
///
/// Returns `DocflowError::Io` if the file cannot be read.
pub async fn read_source_list(path: impl AsRef<Path>) -> Result<Vec<Source>, DocflowError> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(parse_source_list(&text))
}

/// Spawns the task that feeds `sources` into a new bounded sequence.
///
/// The task owns the only sender, so the sequence closes when every source has
/// been sent or the token closes, whichever comes first. The task yields the
/// number of sources it delivered.
pub(crate) fn spawn_source_reader(
    sources: Vec<Source>,
    capacity: usize,
    cancel: CancellationObserver,
) -> (mpsc::Receiver<Source>, JoinHandle<usize>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let total = sources.len();

    let task = async move {
        let mut sent = 0;
        for source in sources {
            let delivered = tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                result = tx.send(source) => result.is_ok(),
            };
            if !delivered {
                break;
            }
            sent += 1;
        }
        debug!(sent, total, "Source list exhausted");
        sent
    };

    (rx, tokio::spawn(task.instrument(info_span!("sources"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_parse_source_list() {
        let text = "# threads\nhttps://a.example/p/1\n\n   https://b.example/p/2  \n#https://skipped\n";
        let ids: Vec<_> = parse_source_list(text).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["https://a.example/p/1", "https://b.example/p/2"]);
    }

    #[tokio::test]
    async fn test_read_source_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "A\nB\r\nC").unwrap();

        let sources = read_source_list(file.path()).await.unwrap();
        assert_eq!(sources, vec![Source::new("A"), Source::new("B"), Source::new("C")]);

        let err = read_source_list("/no/such/url.txt").await.unwrap_err();
        assert!(matches!(err, DocflowError::Io(_)));
    }

    #[tokio::test]
    async fn test_reader_closes_when_exhausted() {
        let token = CancellationToken::new();
        let (mut rx, task) =
            spawn_source_reader(vec![Source::new("A"), Source::new("B")], 1, token.observe());

        assert_eq!(rx.recv().await, Some(Source::new("A")));
        assert_eq!(rx.recv().await, Some(Source::new("B")));
        assert_eq!(rx.recv().await, None);
        assert_eq!(task.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reader_abandons_on_cancel() {
        let token = CancellationToken::new();
        let sources = (0..100).map(|i| Source::new(i.to_string())).collect();
        let (mut rx, task) = spawn_source_reader(sources, 1, token.observe());

        // Nobody reads: the reader blocks on a full sequence until cancelled.
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("stop");

        let sent = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reader should stop on cancel")
            .unwrap();
        assert_eq!(sent, 1);
        assert_eq!(rx.recv().await, Some(Source::new("0")));
        assert_eq!(rx.recv().await, None);
    }
}

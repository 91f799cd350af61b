//! Follow a log file written by an external tool and re-emit its lines

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::models::{AppEvent, OutputStream};
use crate::process::classify::{classify_line, forward_line};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Background follower for a tool log file
pub struct LogTail {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl LogTail {
    /// Start following `path`. The file does not need to exist yet.
    pub fn spawn(
        path: PathBuf,
        process_name: &str,
        sink: Option<mpsc::UnboundedSender<AppEvent>>,
    ) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let name = process_name.to_string();
        let task = tokio::spawn(async move { tail_loop(path, name, sink, stop_rx).await });
        Self {
            stop: Some(stop_tx),
            task,
        }
    }

    /// Stop following after draining everything written so far
    pub async fn finish(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.task).await;
    }
}

async fn tail_loop(
    path: PathBuf,
    name: String,
    sink: Option<mpsc::UnboundedSender<AppEvent>>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut offset = 0u64;
    let mut pending = String::new();

    loop {
        read_new_lines(&path, &mut offset, &mut pending, &name, sink.as_ref()).await;
        tokio::select! {
            _ = &mut stop => break,
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    read_new_lines(&path, &mut offset, &mut pending, &name, sink.as_ref()).await;
    let rest = pending.trim_end();
    if !rest.is_empty() {
        let level = classify_line(OutputStream::ToolLog, rest);
        forward_line(&name, level, rest.to_string(), sink.as_ref());
    }
}

async fn read_new_lines(
    path: &Path,
    offset: &mut u64,
    pending: &mut String,
    name: &str,
    sink: Option<&mpsc::UnboundedSender<AppEvent>>,
) {
    let Ok(mut file) = tokio::fs::File::open(path).await else {
        return;
    };
    if file.seek(SeekFrom::Start(*offset)).await.is_err() {
        return;
    }
    let mut bytes = Vec::new();
    match file.read_to_end(&mut bytes).await {
        Ok(n) => *offset += n as u64,
        Err(e) => {
            log::debug!("Could not read {}: {}", path.display(), e);
            return;
        }
    }
    pending.push_str(&String::from_utf8_lossy(&bytes));

    while let Some(pos) = pending.find('\n') {
        let raw: String = pending.drain(..=pos).collect();
        let line = raw.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            continue;
        }
        let level = classify_line(OutputStream::ToolLog, line);
        forward_line(name, level, line.to_string(), sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<(log::Level, String)> {
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let AppEvent::ProcessOutput(_, level, line) = event {
                lines.push((level, line));
            }
        }
        lines
    }

    #[tokio::test]
    async fn test_tail_follows_appended_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("avrdude.log");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let tail = LogTail::spawn(path.clone(), "platformio", Some(tx));

        std::fs::write(&path, "avrdude: Device signature = 0x1e9801\n").unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "avrdude: error: programmer is not responding").unwrap();
            write!(file, "avrdude done.  Thank you.").unwrap();
        }
        tail.finish().await;

        let lines = drain(&mut rx);
        assert_eq!(
            lines,
            vec![
                (log::Level::Info, "avrdude: Device signature = 0x1e9801".to_string()),
                (
                    log::Level::Error,
                    "avrdude: error: programmer is not responding".to_string()
                ),
                (log::Level::Info, "avrdude done.  Thank you.".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_quiet() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let tail = LogTail::spawn(dir.path().join("never.log"), "platformio", Some(tx));
        tail.finish().await;
        assert!(drain(&mut rx).is_empty());
    }
}

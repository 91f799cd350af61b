//! Log classification for external process output

use log::Level;
use tokio::sync::mpsc;

use crate::models::{AppEvent, OutputStream};

/// Pick the log level for one line of process output.
///
/// Anything mentioning "error" is escalated regardless of the stream it came
/// from. Redirected tool logs are informational otherwise, since the flashing
/// tool writes its normal chatter there.
pub fn classify_line(stream: OutputStream, line: &str) -> Level {
    if line.to_lowercase().contains("error") {
        return Level::Error;
    }
    match stream {
        OutputStream::Stdout | OutputStream::ToolLog => Level::Info,
        OutputStream::Stderr => Level::Warn,
    }
}

/// Send a classified line to the log and, if present, the presentation channel
pub fn forward_line(
    process_name: &str,
    level: Level,
    line: String,
    sink: Option<&mpsc::UnboundedSender<AppEvent>>,
) {
    log::log!(level, "{}: {}", process_name, line);
    if let Some(tx) = sink {
        let _ = tx.send(AppEvent::ProcessOutput(process_name.to_string(), level, line));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_lines_are_escalated() {
        assert_eq!(
            classify_line(OutputStream::Stdout, "Compiling .pio/build/ramps/src/main.o"),
            Level::Info
        );
        assert_eq!(
            classify_line(OutputStream::Stdout, "src/main.cpp:12: Error: expected ';'"),
            Level::Error
        );
        assert_eq!(classify_line(OutputStream::Stderr, "Looking for upload port..."), Level::Warn);
        assert_eq!(
            classify_line(OutputStream::ToolLog, "avrdude: 12345 bytes of flash verified"),
            Level::Info
        );
        assert_eq!(
            classify_line(OutputStream::ToolLog, "avrdude: stk500v2_ReceiveMessage(): timeout ERROR"),
            Level::Error
        );
    }

    #[tokio::test]
    async fn test_forward_line_reaches_sink() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        forward_line("platformio", Level::Warn, "careful".to_string(), Some(&tx));

        match rx.recv().await {
            Some(AppEvent::ProcessOutput(name, level, line)) => {
                assert_eq!(name, "platformio");
                assert_eq!(level, Level::Warn);
                assert_eq!(line, "careful");
            }
            other => panic!("Expected ProcessOutput event, got: {:?}", other),
        }
    }
}

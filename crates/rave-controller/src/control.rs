//! Operator input: stdin keys and Ctrl-C.
//!
//! One command per line:
//!
//! | input | signal |
//! |---|---|
//! | `s`, `start` | Start |
//! | empty line, `r`, `resync` | Resync (tap Enter on the downbeat) |
//! | `q`, `quit`, `stop` | Stop |

use rave_beat::{ClockControlSignal, ControlHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Map one input line to a signal.
pub fn parse_command(line: &str) -> Option<ClockControlSignal> {
    match line.trim().to_ascii_lowercase().as_str() {
        "s" | "start" => Some(ClockControlSignal::Start),
        "" | "r" | "resync" => Some(ClockControlSignal::Resync),
        "q" | "quit" | "stop" => Some(ClockControlSignal::Stop),
        _ => None,
    }
}

/// Forward commands from `input` until it ends or a stop is sent.
pub async fn forward_commands<R>(input: R, control: ControlHandle) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Some(signal) => {
                if control.send(signal) {
                    info!("Operator: {:?}", signal);
                } else {
                    debug!("Operator {:?} refused by the clock", signal);
                }
                if signal == ClockControlSignal::Stop {
                    break;
                }
            }
            None => warn!("Unknown command {:?} (s = start, Enter = resync, q = stop)", line),
        }
    }
    Ok(())
}

/// Read operator commands from stdin in the background.
pub fn spawn_stdin(control: ControlHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = forward_commands(stdin, control).await {
            warn!("Stdin control stopped: {}", e);
        }
    })
}

/// Turn Ctrl-C into a stop.
pub fn spawn_ctrl_c(control: ControlHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                control.stop();
            }
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rave_beat::control_channel;

    #[test]
    fn parses_operator_keys() {
        assert_eq!(parse_command("s"), Some(ClockControlSignal::Start));
        assert_eq!(parse_command(" START \n"), Some(ClockControlSignal::Start));
        assert_eq!(parse_command(""), Some(ClockControlSignal::Resync));
        assert_eq!(parse_command("r"), Some(ClockControlSignal::Resync));
        assert_eq!(parse_command("q"), Some(ClockControlSignal::Stop));
        assert_eq!(parse_command("stop"), Some(ClockControlSignal::Stop));
        assert_eq!(parse_command("x"), None);
    }

    #[tokio::test]
    async fn forwards_until_stop() {
        let (handle, mut rx) = control_channel();
        let input: &[u8] = b"s\nbogus\nq\ns\n";
        forward_commands(input, handle.clone()).await.unwrap();

        // Stop is sticky, and the trailing `s` was never read.
        assert_eq!(rx.take(), Some(ClockControlSignal::Stop));
        assert!(!handle.start());
    }

    #[tokio::test]
    async fn enter_does_not_cancel_a_pending_start() {
        let (handle, mut rx) = control_channel();
        let input: &[u8] = b"s\n\n";
        forward_commands(input, handle).await.unwrap();
        assert_eq!(rx.take(), Some(ClockControlSignal::Start));
    }

    #[tokio::test]
    async fn later_command_replaces_a_pending_resync() {
        let (handle, mut rx) = control_channel();
        let input: &[u8] = b"r\ns\n";
        forward_commands(input, handle).await.unwrap();
        assert_eq!(rx.take(), Some(ClockControlSignal::Start));
    }
}

//! Line-oriented control interface read from stdin.

use log::debug;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::str::FromStr;
use tokio::sync::mpsc;

use crate::error::CommandError;
use crate::models::Slot;

pub const HELP: &str = "\
Commands:
  save <n> [filename]   lock the log filename of device n (default 'Device n_data_log.txt')
  connect <n>           scan for devices for device n
  select <n> <k>        connect device n to the k-th device found
  cancel <n>            abandon a scan of device n
  disconnect <n>        disconnect device n
  event                 log an event row for every streaming device
  window <secs>         set the plot window (10-60 s)
  help                  show this help
  quit                  disconnect everything and exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Save { slot: Slot, filename: Option<PathBuf> },
    Connect(Slot),
    Select { slot: Slot, candidate: usize },
    Cancel(Slot),
    Disconnect(Slot),
    Event,
    Window(u32),
    Help,
    Quit,
}

fn parse_slot(token: Option<&str>) -> Result<Slot, CommandError> {
    let token = token.ok_or(CommandError::MissingArgument("device number"))?;
    token
        .parse()
        .ok()
        .and_then(Slot::from_number)
        .ok_or_else(|| CommandError::InvalidSlot(token.to_string()))
}

fn parse_number<T: FromStr>(token: Option<&str>, what: &'static str) -> Result<T, CommandError> {
    let token = token.ok_or(CommandError::MissingArgument(what))?;
    token
        .parse()
        .map_err(|_| CommandError::InvalidNumber(token.to_string()))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(CommandError::Empty)?;

        let command = match name.to_ascii_lowercase().as_str() {
            "save" => {
                let slot = parse_slot(tokens.next())?;
                // the filename is the rest of the line, spaces included
                let rest = tokens.collect::<Vec<_>>().join(" ");
                let filename = (!rest.is_empty()).then(|| PathBuf::from(rest));
                Command::Save { slot, filename }
            }
            "connect" => Command::Connect(parse_slot(tokens.next())?),
            "select" => Command::Select {
                slot: parse_slot(tokens.next())?,
                candidate: parse_number(tokens.next(), "device choice")?,
            },
            "cancel" => Command::Cancel(parse_slot(tokens.next())?),
            "disconnect" => Command::Disconnect(parse_slot(tokens.next())?),
            "event" | "e" => Command::Event,
            "window" => Command::Window(parse_number(tokens.next(), "window length")?),
            "help" | "h" | "?" => Command::Help,
            "quit" | "q" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Relay stdin lines to the event loop from a blocking reader thread
///
/// The thread ends on EOF, on a read error, or once the receiver is gone.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        debug!("stdin closed");
    });

    line_rx
}

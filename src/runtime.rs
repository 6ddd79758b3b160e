use std::io::BufRead;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

/// Unified event type consumed by the host loop
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleEvent {
    Command(String),
    Tick,
}

/// Source of typed commands
pub trait CommandSource: Send + 'static {
    /// Block for up to `timeout` waiting for a command.
    /// Returns Ok(event) if one arrives before the timeout, or Err(Timeout) if it expires.
    fn recv_timeout(&self, timeout: Duration) -> Result<ConsoleEvent, RecvTimeoutError>;
}

/// Production command source reading lines from stdin
pub struct StdinCommandSource {
    rx: Receiver<ConsoleEvent>,
}

impl StdinCommandSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if tx.send(ConsoleEvent::Command(line)).is_err() {
                    break;
                }
            }
        });

        Self { rx }
    }
}

impl Default for StdinCommandSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandSource for StdinCommandSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ConsoleEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Test command source for unit tests
pub struct TestCommandSource {
    rx: Receiver<ConsoleEvent>,
}

impl TestCommandSource {
    pub fn new(rx: Receiver<ConsoleEvent>) -> Self {
        Self { rx }
    }
}

impl CommandSource for TestCommandSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<ConsoleEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the host one command/tick at a time
pub struct Runner<E: CommandSource, T: Ticker> {
    source: E,
    ticker: T,
}

impl<E: CommandSource, T: Ticker> Runner<E, T> {
    pub fn new(source: E, ticker: T) -> Self {
        Self { source, ticker }
    }

    /// Blocks up to tick interval and returns the next command, or Tick on timeout
    pub fn step(&self) -> ConsoleEvent {
        match self.source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                ConsoleEvent::Tick
            }
        }
    }
}

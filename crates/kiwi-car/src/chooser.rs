//! Direction chooser: answers `SafeToGo` with a `ChooseDirectionRequest`

use kiwi_bus::{BusError, Direction, LocalBus, Message, Subscription};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{info, warn};

use crate::cli::DirectionMode;

const PROMPT: &str = "Safe to go. Choose direction: 1 = right, 2 = straight, 3 = left\n> ";

/// Picks the leaving direction once the intersection is clear
pub struct DirectionChooser<R, W> {
    bus: LocalBus,
    mode: DirectionMode,
    input: Lines<R>,
    output: W,
}

impl<R, W> DirectionChooser<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// `input` and `output` are only used in [`DirectionMode::Prompt`]
    pub fn new(bus: LocalBus, mode: DirectionMode, input: R, output: W) -> Self {
        Self {
            bus,
            mode,
            input: input.lines(),
            output,
        }
    }

    /// Ask for a direction until a valid code is entered. `None` once the
    /// input is exhausted.
    pub async fn prompt(&mut self) -> std::io::Result<Option<Direction>> {
        loop {
            self.output.write_all(PROMPT.as_bytes()).await?;
            self.output.flush().await?;

            let Some(line) = self.input.next_line().await? else {
                return Ok(None);
            };
            let code = line.trim().parse::<u8>().ok();
            match code.map(Direction::try_from) {
                Some(Ok(direction)) => return Ok(Some(direction)),
                _ => {
                    self.output
                        .write_all(format!("'{}' is not a direction\n", line.trim()).as_bytes())
                        .await?;
                }
            }
        }
    }

    /// Answer every `SafeToGo` seen on `subscription`
    pub async fn run(mut self, mut subscription: Subscription) -> anyhow::Result<()> {
        loop {
            let envelope = match subscription.recv().await {
                Ok(envelope) => envelope,
                Err(BusError::Closed) => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            if envelope.message != Message::SafeToGo {
                continue;
            }

            let direction = match self.mode {
                DirectionMode::Fixed(direction) => direction,
                DirectionMode::Prompt => match self.prompt().await? {
                    Some(direction) => direction,
                    None => {
                        warn!("Direction input closed, no direction chosen");
                        return Ok(());
                    }
                },
            };

            info!(%direction, "Direction chosen");
            self.bus.send(Message::ChooseDirectionRequest { direction })?;
        }
    }
}

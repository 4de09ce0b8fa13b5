use tracing::debug;

use crate::error::{Result, TesiraError};
use crate::transport::Transport;

/// Banner the device prints once the Telnet session is up.
const WELCOME_BANNER: &[u8] = b"Welcome to the Tesira Text Protocol Server...";

/// Negotiation rounds before giving up. Normal handshakes settle in 3-4.
const MAX_ROUNDS: u32 = 7;

const IAC_WILL: u8 = 0xfb;
const IAC_WONT: u8 = 0xfc;
const IAC_DO: u8 = 0xfd;
const IAC_DONT: u8 = 0xfe;

/// Where the handshake stands after each line from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NegotiationState {
    /// Nothing meaningful received yet
    AwaitingWelcome,
    /// Banner seen; the device may still push more option requests
    AwaitingSilence,
    /// Handshake complete
    Done,
    /// No banner ever arrived
    Aborted,
}

/// Rewrite an option request into its refusal: DO becomes WON'T and WILL
/// becomes DON'T, every other byte passes through unchanged.
pub(crate) fn reject_options(payload: &[u8]) -> Vec<u8> {
    payload
        .iter()
        .map(|&byte| match byte {
            IAC_DO => IAC_WONT,
            IAC_WILL => IAC_DONT,
            other => other,
        })
        .collect()
}

/// Advance the handshake by one line. `None` means the device went quiet.
/// Returns the next state and the bytes to send back, if any.
pub(crate) fn step(
    state: NegotiationState,
    line: Option<&[u8]>,
) -> (NegotiationState, Option<Vec<u8>>) {
    match state {
        NegotiationState::Done | NegotiationState::Aborted => (state, None),
        NegotiationState::AwaitingWelcome => match line {
            None => (NegotiationState::Aborted, None),
            Some(payload) if payload == WELCOME_BANNER => (NegotiationState::AwaitingSilence, None),
            Some(payload) => (NegotiationState::AwaitingWelcome, Some(reject_options(payload))),
        },
        NegotiationState::AwaitingSilence => match line {
            None => (NegotiationState::Done, None),
            Some(payload) if payload == WELCOME_BANNER => (NegotiationState::AwaitingSilence, None),
            Some(payload) => (NegotiationState::AwaitingSilence, Some(reject_options(payload))),
        },
    }
}

/// Run the Telnet handshake on a freshly opened session.
///
/// Reads lines until the device falls silent after its banner, refusing
/// every option it proposes along the way. Bounded by [`MAX_ROUNDS`] so a
/// misbehaving peer cannot hold the loop open forever.
pub(crate) async fn negotiate(transport: &dyn Transport, socket_key: &str) -> Result<()> {
    let mut state = NegotiationState::AwaitingWelcome;

    for round in 1..=MAX_ROUNDS {
        let line = transport
            .read_line(socket_key)
            .await
            .filter(|payload| !payload.is_empty());
        match &line {
            Some(payload) => debug!(round, payload = %hex(payload), "negotiation from the device"),
            None => debug!(round, "no more negotiation data"),
        }

        let (next, reply) = step(state, line.as_deref());
        state = next;

        if let Some(bytes) = reply {
            debug!(round, payload = %hex(&bytes), "refusing negotiation options");
            if let Err(e) = transport.send_line(socket_key, &bytes).await {
                transport.report_error(socket_key, &format!("negotiation reply failed: {e}"));
            }
        }

        match state {
            NegotiationState::Done => {
                debug!(socket_key, "negotiations are over");
                return Ok(());
            }
            NegotiationState::Aborted => {
                let msg = "no response from the device, ending negotiations".to_string();
                transport.report_error(socket_key, &msg);
                return Err(TesiraError::NegotiationFailed(msg));
            }
            _ => {}
        }
    }

    let msg = format!("stopped negotiation loop after {MAX_ROUNDS} rounds");
    transport.report_error(socket_key, &msg);
    Err(TesiraError::NegotiationFailed(msg))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

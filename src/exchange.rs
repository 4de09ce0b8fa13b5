use tracing::{debug, warn};

use crate::error::{Result, TesiraError};
use crate::protocol::{classify, Classification, Command};
use crate::transport::Transport;

/// How many lines to read before declaring that no valid answer is coming.
/// The device may interleave echoes and responses for other exchanges.
const MAX_READ_ATTEMPTS: u32 = 5;

/// Send one command and read until its answer shows up.
///
/// Echoes and unrelated lines are discarded, each consuming one of the
/// bounded read attempts. An `-ERR` line or a blank read fails
/// immediately. The accepted value is the extracted `"value":` payload for
/// queries and the full acknowledgement line for commands.
pub(crate) async fn send_and_validate(
    transport: &dyn Transport,
    socket_key: &str,
    command: &Command,
) -> Result<String> {
    debug!("command sent: {}", command.line().trim_end());
    if let Err(e) = transport.send_line(socket_key, command.line().as_bytes()).await {
        transport.report_error(socket_key, &format!("unable to send command: {e}"));
        return Err(TesiraError::SendFailed);
    }

    for _ in 0..MAX_READ_ATTEMPTS {
        let Some(raw) = transport
            .read_line(socket_key)
            .await
            .filter(|line| !line.is_empty())
        else {
            transport.report_error(socket_key, "response was blank");
            return Err(TesiraError::BlankResponse);
        };
        let response = String::from_utf8_lossy(&raw).into_owned();

        match classify(command, &response) {
            Classification::Echo => {
                debug!("got an echo, reading again");
            }
            Classification::DeviceError(text) => {
                warn!(response = %text, "read error from the device");
                return Err(TesiraError::DeviceError(text));
            }
            Classification::Accepted(value) => return Ok(value),
            Classification::Mismatch => {
                debug!(%response, "response did not match what was expected, reading again");
            }
        }
    }

    Err(TesiraError::NoValidResponse {
        attempts: MAX_READ_ATTEMPTS,
    })
}

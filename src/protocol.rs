/// Whether a command mutates state or reads it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// A `get` that answers with a `"value":` payload
    Query,
    /// A `set`/recall acknowledged with `+OK`
    Command,
}

/// What a query's `"value":` payload must look like to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedValue {
    /// A decimal number (levels, gains)
    Number,
    /// Exactly `true` or `false` (mutes, logic states)
    State,
    /// No payload expected (state-mutating commands)
    None,
}

/// One outbound line for the device, carriage-return terminated.
#[derive(Debug, Clone)]
pub struct Command {
    line: String,
    kind: CommandKind,
    expects: ExpectedValue,
}

impl Command {
    /// Build a `get` query whose answer carries a typed `"value":` payload.
    pub fn query(body: impl Into<String>, expects: ExpectedValue) -> Self {
        Self {
            line: terminate(body.into()),
            kind: CommandKind::Query,
            expects,
        }
    }

    /// Build a state-mutating command acknowledged with `+OK`.
    pub fn command(body: impl Into<String>) -> Self {
        Self {
            line: terminate(body.into()),
            kind: CommandKind::Command,
            expects: ExpectedValue::None,
        }
    }

    /// The wire line, including its trailing carriage return.
    pub fn line(&self) -> &str {
        &self.line
    }

    /// How responses to this command are classified.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// The payload shape a query accepts.
    pub fn expects(&self) -> ExpectedValue {
        self.expects
    }
}

fn terminate(mut body: String) -> String {
    body.push('\r');
    body
}

/// What one inbound line turned out to be, relative to the command sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Classification {
    /// The device repeated our command back; not an answer
    Echo,
    /// An `-ERR` line
    DeviceError(String),
    /// The answer we were waiting for, payload extracted
    Accepted(String),
    /// Some other line, likely for a different exchange
    Mismatch,
}

/// Classify one response line against the command it should answer.
pub(crate) fn classify(command: &Command, response: &str) -> Classification {
    if response.trim() == command.line.trim() {
        return Classification::Echo;
    }
    if response.starts_with("-ERR") {
        return Classification::DeviceError(response.to_string());
    }

    match command.kind {
        CommandKind::Command => {
            if response.starts_with("+OK") {
                Classification::Accepted(response.to_string())
            } else {
                Classification::Mismatch
            }
        }
        CommandKind::Query => match extract_value(response) {
            Some(value) => match command.expects {
                ExpectedValue::Number if value.parse::<f64>().is_ok() => {
                    Classification::Accepted(value.to_string())
                }
                ExpectedValue::State if value == "true" || value == "false" => {
                    Classification::Accepted(value.to_string())
                }
                _ => Classification::Mismatch,
            },
            None => Classification::Mismatch,
        },
    }
}

/// Pull the payload out of a `"value":` response line.
///
/// A trailing close brace is tolerated so JSON-shaped responses classify
/// the same as the device's bare `+OK "value":x` form.
fn extract_value(response: &str) -> Option<&str> {
    let (_, raw) = response.split_once("\"value\":")?;
    Some(raw.trim().trim_end_matches('}').trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_lines_are_cr_terminated() {
        let cmd = Command::query("Mixer1 get level 1", ExpectedValue::Number);
        assert_eq!(cmd.line(), "Mixer1 get level 1\r");
        assert_eq!(cmd.kind(), CommandKind::Query);
    }

    #[test]
    fn echo_is_detected_despite_terminators() {
        let cmd = Command::query("Mixer1 get level 1", ExpectedValue::Number);
        assert_eq!(classify(&cmd, "Mixer1 get level 1"), Classification::Echo);
    }

    #[test]
    fn err_line_classifies_as_device_error() {
        let cmd = Command::command("Mixer1 set level 1 0.0");
        assert_eq!(
            classify(&cmd, "-ERR invalid target"),
            Classification::DeviceError("-ERR invalid target".into())
        );
    }

    #[test]
    fn ok_acknowledges_a_command() {
        let cmd = Command::command("DEVICE recallPreset 1001");
        assert_eq!(
            classify(&cmd, "+OK"),
            Classification::Accepted("+OK".into())
        );
    }

    #[test]
    fn value_response_does_not_acknowledge_a_command() {
        let cmd = Command::command("Mixer1 set mute 1 true");
        assert_eq!(classify(&cmd, "\"value\":true"), Classification::Mismatch);
    }

    #[test]
    fn numeric_payload_is_extracted() {
        let cmd = Command::query("Mixer1 get level 1", ExpectedValue::Number);
        assert_eq!(
            classify(&cmd, "+OK \"value\":-12.5"),
            Classification::Accepted("-12.5".into())
        );
        assert_eq!(
            classify(&cmd, "{\"value\":42.0}"),
            Classification::Accepted("42.0".into())
        );
    }

    #[test]
    fn non_numeric_payload_is_rejected_for_number_queries() {
        let cmd = Command::query("Mixer1 get level 1", ExpectedValue::Number);
        assert_eq!(classify(&cmd, "+OK \"value\":true"), Classification::Mismatch);
    }

    #[test]
    fn state_payload_must_be_a_boolean_token() {
        let cmd = Command::query("Mixer1 get mute 1", ExpectedValue::State);
        assert_eq!(
            classify(&cmd, "+OK \"value\":true"),
            Classification::Accepted("true".into())
        );
        assert_eq!(
            classify(&cmd, "+OK \"value\":false"),
            Classification::Accepted("false".into())
        );
        assert_eq!(classify(&cmd, "+OK \"value\":maybe"), Classification::Mismatch);
        assert_eq!(classify(&cmd, "+OK \"value\":1.0"), Classification::Mismatch);
    }

    #[test]
    fn unrelated_lines_mismatch() {
        let cmd = Command::query("Mixer1 get level 1", ExpectedValue::Number);
        assert_eq!(classify(&cmd, "+OK"), Classification::Mismatch);
        assert_eq!(classify(&cmd, "something else"), Classification::Mismatch);
    }
}

use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, TesiraError};
use crate::exchange::send_and_validate;
use crate::protocol::{Command, ExpectedValue};
use crate::retry::RetryPolicy;
use crate::scale;
use crate::telnet;
use crate::transport::Transport;

/// How many state channels an audio-mode selector block exposes.
const AUDIO_MODE_CHANNELS: u32 = 5;

/// Target for device-wide commands like preset recall and hostname.
const DEVICE_TARGET: &str = "DEVICE";

/// Handle for one DSP behind a transport connection key.
///
/// Every operation lazily negotiates the Telnet session when the transport
/// has no record of one, then runs a single command/response exchange
/// under the shared retry policy. Operations are idempotent with respect
/// to the device's actual state; callers on the same key must serialize.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use biamp_tesira::{Device, TcpTransport};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = Arc::new(TcpTransport::new());
///     let device = Device::new(transport, "192.168.1.50");
///     device.set_volume("Mixer1", "1", "75").await?;
///     let level = device.volume("Mixer1", "1").await?;
///     println!("level now {level}%");
///     Ok(())
/// }
/// ```
pub struct Device {
    transport: Arc<dyn Transport>,
    socket_key: String,
    retry: RetryPolicy,
}

impl Device {
    /// Create a handle for the device behind `socket_key`.
    pub fn new(transport: Arc<dyn Transport>, socket_key: impl Into<String>) -> Self {
        Self {
            transport,
            socket_key: socket_key.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the default retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The connection key this handle drives.
    pub fn socket_key(&self) -> &str {
        &self.socket_key
    }

    /// Negotiate the Telnet session if the transport has no record of one.
    async fn ensure_session(&self) -> Result<()> {
        if self.transport.connection_exists(&self.socket_key) {
            return Ok(());
        }
        telnet::negotiate(self.transport.as_ref(), &self.socket_key).await
    }

    /// One full exchange: session up, command out, classified answer back.
    async fn exchange(&self, command: Command) -> Result<String> {
        self.ensure_session().await?;
        send_and_validate(self.transport.as_ref(), &self.socket_key, &command).await
    }

    fn report_if_failed<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.transport
                .report_error(&self.socket_key, &format!("{operation} failed: {e}"));
        }
        result
    }

    // ========== Level (volume) ==========

    /// Get a channel's level as a percentage in 0-100.
    pub async fn volume(&self, instance_tag: &str, channel: &str) -> Result<String> {
        let result = self
            .retry
            .run("volume", || self.volume_do(instance_tag, channel))
            .await;
        self.report_if_failed("volume", result)
    }

    async fn volume_do(&self, instance_tag: &str, channel: &str) -> Result<String> {
        let command = Command::query(
            format!("{instance_tag} get level {channel}"),
            ExpectedValue::Number,
        );
        let db = self.exchange(command).await?;
        let percent = scale::to_percent(&db)?;
        debug!("decoded level: {percent}% ({db} dB)");
        Ok(percent)
    }

    /// Set a channel's level from a percentage in 0-100.
    pub async fn set_volume(&self, instance_tag: &str, channel: &str, percent: &str) -> Result<()> {
        let db = self.report_if_failed(
            "set volume",
            scale::to_device_db(percent.trim_matches('"')),
        )?;
        debug!("transformed level: {db} dB");
        let result = self
            .retry
            .run("set volume", || {
                self.command_do(format!("{instance_tag} set level {channel} {db}"))
            })
            .await;
        self.report_if_failed("set volume", result)
    }

    // ========== Gain ==========

    /// Get a block's gain as a percentage in 0-100.
    pub async fn gain(&self, instance_tag: &str) -> Result<String> {
        let result = self.retry.run("gain", || self.gain_do(instance_tag)).await;
        self.report_if_failed("gain", result)
    }

    async fn gain_do(&self, instance_tag: &str) -> Result<String> {
        let command = Command::query(format!("{instance_tag} get gain"), ExpectedValue::Number);
        let db = self.exchange(command).await?;
        let percent = scale::to_percent(&db)?;
        debug!("decoded gain: {percent}% ({db} dB)");
        Ok(percent)
    }

    /// Set a block's gain from a percentage in 0-100.
    pub async fn set_gain(&self, instance_tag: &str, percent: &str) -> Result<()> {
        let db = self.report_if_failed("set gain", scale::to_device_db(percent.trim_matches('"')))?;
        debug!("transformed gain: {db} dB");
        let result = self
            .retry
            .run("set gain", || {
                self.command_do(format!("{instance_tag} set gain {db}"))
            })
            .await;
        self.report_if_failed("set gain", result)
    }

    // ========== Mute ==========

    /// Get a channel's mute state: `true` when muted.
    pub async fn mute(&self, instance_tag: &str, channel: &str) -> Result<String> {
        let result = self
            .retry
            .run("audiomute", || self.mute_do(instance_tag, channel))
            .await;
        self.report_if_failed("audiomute", result)
    }

    async fn mute_do(&self, instance_tag: &str, channel: &str) -> Result<String> {
        let command = Command::query(
            format!("{instance_tag} get mute {channel}"),
            ExpectedValue::State,
        );
        self.exchange(command).await
    }

    /// Set a channel's mute state to `true` or `false`.
    pub async fn set_mute(&self, instance_tag: &str, channel: &str, state: &str) -> Result<()> {
        let state = state.trim_matches('"');
        let result = self
            .retry
            .run("set audiomute", || {
                self.command_do(format!("{instance_tag} set mute {channel} {state}"))
            })
            .await;
        self.report_if_failed("set audiomute", result)
    }

    // ========== Voice lift ==========

    /// Whether voice lift is `on` or `off`.
    ///
    /// The device models voice lift as a mute, so the answer is inverted:
    /// a muted channel means the lift is off.
    pub async fn voice_lift(&self, instance_tag: &str, channel: &str) -> Result<String> {
        let result = self
            .retry
            .run("voicelift", || self.mute_do(instance_tag, channel))
            .await;
        let muted = self.report_if_failed("voicelift", result)?;
        Ok(if muted == "true" { "off" } else { "on" }.to_string())
    }

    /// Turn voice lift `on` or `off` by driving the underlying mute.
    pub async fn set_voice_lift(
        &self,
        instance_tag: &str,
        channel: &str,
        state: &str,
    ) -> Result<()> {
        let device_state = match state.trim_matches('"') {
            "on" => "false",
            "off" => "true",
            other => other,
        };
        let result = self
            .retry
            .run("set voicelift", || {
                self.command_do(format!("{instance_tag} set mute {channel} {device_state}"))
            })
            .await;
        self.report_if_failed("set voicelift", result)
    }

    // ========== Logic selector ==========

    /// Get a channel's logic state: `true` or `false`.
    pub async fn logic_state(&self, instance_tag: &str, channel: &str) -> Result<String> {
        let result = self
            .retry
            .run("logicselector", || self.state_do(instance_tag, channel))
            .await;
        self.report_if_failed("logicselector", result)
    }

    async fn state_do(&self, instance_tag: &str, channel: &str) -> Result<String> {
        let command = Command::query(
            format!("{instance_tag} get state {channel}"),
            ExpectedValue::State,
        );
        self.exchange(command).await
    }

    /// Set a channel's logic state to `true` or `false`.
    pub async fn set_logic_state(
        &self,
        instance_tag: &str,
        channel: &str,
        state: &str,
    ) -> Result<()> {
        let state = state.trim_matches('"');
        let result = self
            .retry
            .run("set logicselector", || {
                self.command_do(format!("{instance_tag} set state {channel} {state}"))
            })
            .await;
        self.report_if_failed("set logicselector", result)
    }

    // ========== Audio mode ==========

    /// Find which selector channel is active, as a 1-based index.
    ///
    /// Scans the state of channels 1 through 5 in order and returns the
    /// first that reports `true`. A transient query failure fails the scan
    /// and the retry policy restarts it from channel 1.
    pub async fn audio_mode(&self, instance_tag: &str) -> Result<String> {
        let result = self
            .retry
            .run("audiomode", || self.audio_mode_do(instance_tag))
            .await;
        self.report_if_failed("audiomode", result)
    }

    async fn audio_mode_do(&self, instance_tag: &str) -> Result<String> {
        for channel in 1..=AUDIO_MODE_CHANNELS {
            let state = self.state_do(instance_tag, &channel.to_string()).await?;
            if state == "true" {
                return Ok(channel.to_string());
            }
        }
        Err(TesiraError::NoActiveChannel)
    }

    /// Activate a selector channel by setting its state to `true`.
    pub async fn set_audio_mode(&self, instance_tag: &str, channel: &str) -> Result<()> {
        let channel = channel.trim_matches('"');
        let result = self
            .retry
            .run("set audiomode", || {
                self.command_do(format!("{instance_tag} set state {channel} true"))
            })
            .await;
        self.report_if_failed("set audiomode", result)
    }

    // ========== Presets ==========

    /// Recall a device preset by ID. Device presets start at 1001.
    pub async fn recall_preset(&self, preset_id: &str) -> Result<()> {
        let result = self
            .retry
            .run("preset", || {
                self.command_do(format!("{DEVICE_TARGET} recallPreset {preset_id}"))
            })
            .await;
        self.report_if_failed("preset", result)
    }

    // ========== Health ==========

    /// Query the device hostname.
    ///
    /// The device answers this on a single acknowledgement line, so it is
    /// exchanged as a command and the full `+OK ...` line is returned.
    pub async fn hostname(&self) -> Result<String> {
        let result = self
            .exchange(Command::command(format!("{DEVICE_TARGET} get hostname")))
            .await;
        self.report_if_failed("hostname", result)
    }

    /// Whether the device is reachable.
    ///
    /// Round-trips a hostname query; only a send or negotiation failure
    /// counts as unreachable, since a device that answers anything at all
    /// is alive.
    pub async fn health_check(&self) -> bool {
        match self.hostname().await {
            Ok(_) => true,
            Err(e) => !e.is_connection_failure(),
        }
    }

    async fn command_do(&self, body: String) -> Result<()> {
        self.exchange(Command::command(body)).await.map(|_| ())
    }
}

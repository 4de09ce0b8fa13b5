use std::sync::Arc;

use serde::Serialize;

use crate::device::Device;
use crate::error::{Result, TesiraError};
use crate::transport::Transport;

/// Entry point for the surrounding REST dispatcher.
///
/// Routes the capability names it receives in request URIs onto [`Device`]
/// operations. Arguments arrive as positional strings (instance tag,
/// channel, value); successful results come back as JSON-quoted string
/// values, ready to be embedded in a response body.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use biamp_tesira::{Dispatcher, TcpTransport};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dispatcher = Dispatcher::new(Arc::new(TcpTransport::new()));
///     dispatcher.set("192.168.1.50", "volume", "Mixer1", "1", "75").await?;
///     let level = dispatcher.get("192.168.1.50", "volume", "Mixer1", "1").await?;
///     println!("level: {level}");
///     Ok(())
/// }
/// ```
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Create a dispatcher over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    fn device(&self, socket_key: &str) -> Device {
        Device::new(self.transport.clone(), socket_key)
    }

    /// Handle a read request: `/:address/:setting/:arg1/:arg2`.
    pub async fn get(
        &self,
        socket_key: &str,
        setting: &str,
        arg1: &str,
        arg2: &str,
    ) -> Result<String> {
        let device = self.device(socket_key);
        let value = match setting {
            "volume" => device.volume(arg1, arg2).await?,
            "audiomute" => device.mute(arg1, arg2).await?,
            "voicelift" => device.voice_lift(arg1, arg2).await?,
            "logicselector" => device.logic_state(arg1, arg2).await?,
            "audiomode" => device.audio_mode(arg1).await?,
            _ => return Err(self.unknown_setting(socket_key, setting)),
        };
        Ok(quoted(&value))
    }

    /// Handle a write request: `/:address/:setting/:arg1/:arg2/:arg3`.
    pub async fn set(
        &self,
        socket_key: &str,
        setting: &str,
        arg1: &str,
        arg2: &str,
        arg3: &str,
    ) -> Result<String> {
        let device = self.device(socket_key);
        match setting {
            "volume" => device.set_volume(arg1, arg2, arg3).await?,
            "audiomute" => device.set_mute(arg1, arg2, arg3).await?,
            "preset" => device.recall_preset(arg1).await?,
            "voicelift" => device.set_voice_lift(arg1, arg2, arg3).await?,
            "logicselector" => device.set_logic_state(arg1, arg2, arg3).await?,
            "audiomode" => device.set_audio_mode(arg1, arg2).await?,
            _ => return Err(self.unknown_setting(socket_key, setting)),
        }
        Ok("ok".to_string())
    }

    /// Health probe, rendered as `"true"` / `"false"` for the monitoring
    /// layer.
    pub async fn health_check(&self, socket_key: &str) -> String {
        let alive = self.device(socket_key).health_check().await;
        quoted(if alive { "true" } else { "false" })
    }

    fn unknown_setting(&self, socket_key: &str, setting: &str) -> TesiraError {
        self.transport.report_error(
            socket_key,
            &format!("unrecognized setting in URI: {setting}"),
        );
        TesiraError::UnknownSetting(setting.to_string())
    }
}

/// Render a value as a JSON string literal, escaping as needed.
fn quoted(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Structured error payload for the dispatcher to serialize into a
/// failure response body.
#[derive(Debug, Clone, Serialize)]
pub struct WireError {
    /// The capability the request named
    pub setting: String,
    /// Human-readable failure detail
    pub detail: String,
}

impl WireError {
    /// Describe a failed request.
    pub fn new(setting: impl Into<String>, error: &TesiraError) -> Self {
        Self {
            setting: setting.into(),
            detail: error.to_string(),
        }
    }
}

//! Rust library for controlling Biamp Tesira DSPs
//!
//! This library lets a control layer manipulate settings on a networked
//! Tesira digital signal processor over the Tesira Text Protocol, a
//! line-oriented, Telnet-framed text command protocol. It supports:
//!
//! - Level (volume) and gain control on a normalized 0-100 scale
//! - Mute, voice lift, and logic selector states
//! - Audio mode selection across selector channels
//! - Device preset recall
//! - Hostname query and health reporting
//!
//! The wire protocol is unreliable in small ways: the device echoes
//! commands back, interleaves responses, pushes unsolicited Telnet
//! negotiation bytes, and frames nothing beyond newline termination. The
//! engine tolerates all of that with bounded retries and classifies every
//! response deterministically, so callers always get either a value or a
//! structured error.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use biamp_tesira::{Dispatcher, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(TcpTransport::new());
//!     let dispatcher = Dispatcher::new(transport);
//!
//!     // Set channel 1 of the "Mixer1" block to 75%.
//!     dispatcher.set("192.168.1.50", "volume", "Mixer1", "1", "75").await?;
//!
//!     // Read it back as a 0-100 percentage.
//!     let level = dispatcher.get("192.168.1.50", "volume", "Mixer1", "1").await?;
//!     println!("level: {level}");
//!     Ok(())
//! }
//! ```
//!
//! # Direct Device Access
//!
//! When the capability-name routing of [`Dispatcher`] is not needed, a
//! [`Device`] handle exposes the same operations as typed methods:
//!
//! ```no_run
//! use std::sync::Arc;
//! use biamp_tesira::{Device, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let device = Device::new(Arc::new(TcpTransport::new()), "192.168.1.50");
//!     device.recall_preset("1001").await?;
//!     println!("healthy: {}", device.health_check().await);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Dispatcher**: capability-name routing for the surrounding REST layer
//! - **Device**: one method per capability, with lazy session negotiation
//!   and a uniform retry policy
//! - **Exchange**: the command/response correlator with bounded reads
//! - **Telnet**: the option-negotiation handshake state machine
//! - **Scale**: the pure percent/dB value transform
//! - **Transport**: pooled TCP connections, injectable for testing

mod device;
mod dispatch;
mod error;
mod exchange;
mod protocol;
mod retry;
mod scale;
mod telnet;
mod transport;

// Public exports
pub use device::Device;
pub use dispatch::{Dispatcher, WireError};
pub use error::{Result, TesiraError};
pub use protocol::{Command, CommandKind, ExpectedValue};
pub use retry::RetryPolicy;
pub use scale::{to_device_db, to_percent};
pub use transport::{TcpTransport, Transport};

//! Set a fader level on a Tesira DSP and read it back.
//!
//! Usage: set_volume [address] [instance-tag] [channel] [percent]

use std::sync::Arc;

use biamp_tesira::{Dispatcher, TcpTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "192.168.1.50".into());
    let tag = args.next().unwrap_or_else(|| "Mixer1".into());
    let channel = args.next().unwrap_or_else(|| "1".into());
    let percent = args.next().unwrap_or_else(|| "75".into());

    let dispatcher = Dispatcher::new(Arc::new(TcpTransport::new()));

    dispatcher
        .set(&address, "volume", &tag, &channel, &percent)
        .await?;
    let level = dispatcher.get(&address, "volume", &tag, &channel).await?;
    println!("{tag} channel {channel} level: {level}");

    Ok(())
}

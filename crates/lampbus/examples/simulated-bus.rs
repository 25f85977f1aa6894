//! Drive a simulated bus end to end: discover the device, write a channel,
//! read it back.
//!
//! Run with:
//!   cargo run --example simulated-bus

use lampbus::frame::{Channel, Message};
use lampbus::session::{validate, ProbeConfig, Session, SessionConfig, Simulator, SimulatorConfig};
use lampbus::transport::{BusStream, DEFAULT_MEMORY_CAPACITY};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (host, bus) = BusStream::memory_pair("demo", DEFAULT_MEMORY_CAPACITY);
    let simulator = Simulator::new(SimulatorConfig {
        lamps: vec![0x04, 0x07],
        ..SimulatorConfig::default()
    });
    tokio::spawn({
        let simulator = simulator.clone();
        async move { simulator.serve(bus).await }
    });

    let session = Session::open(host, SessionConfig::default());
    let cancel = CancellationToken::new();

    let outcome = validate(&session, &cancel, &ProbeConfig::default()).await?;
    match outcome.device_id() {
        Some(id) => eprintln!("Discovered {id} on {}", session.link_id()),
        None => eprintln!("No device answered"),
    }

    session
        .write(Message::write(0x07, Channel::StrobePulseWidth, 250), &cancel)
        .await?;
    let width = session
        .query(Channel::StrobePulseWidth, 0x07, &cancel)
        .await?;
    eprintln!("Lamp 0x07 strobe pulse width: {width}");

    let version = session
        .query(Channel::LampFirmwareVersion, 0x04, &cancel)
        .await?;
    eprintln!("Lamp 0x04 firmware: 0x{version:02x}");

    session.shutdown().await?;
    eprintln!("Simulator saw {} packets", simulator.received());
    Ok(())
}

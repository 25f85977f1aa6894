use lampbus_session::{Simulator, SimulatorConfig};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::cmd::{block_on, SimulateArgs};
use crate::exit::{io_error, CliResult, SUCCESS};

pub fn run(args: SimulateArgs) -> CliResult<i32> {
    let simulator = Simulator::new(SimulatorConfig {
        lamps: args.lamps.clone(),
        firmware_version: args.firmware_version,
        reply_from_master: !args.reply_from_lamp,
    });

    block_on(async move {
        let listener = TcpListener::bind(&args.listen)
            .await
            .map_err(|err| io_error(&format!("bind {} failed", args.listen), err))?;
        let local = listener
            .local_addr()
            .map_err(|err| io_error("listener address unavailable", err))?;
        info!(listen = %local, lamps = ?simulator.lamps(), "simulated bus ready");

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!(%err, "accept failed");
                        continue;
                    }
                },
                _ = tokio::signal::ctrl_c() => break,
            };
            debug!(%peer, "bus client connected");
            let _ = stream.set_nodelay(true);

            let simulator = simulator.clone();
            tokio::spawn(async move {
                if let Err(err) = simulator.serve(stream).await {
                    warn!(%peer, %err, "bus client failed");
                }
            });
        }

        info!(received = simulator.received(), "simulated bus stopped");
        Ok(SUCCESS)
    })
}

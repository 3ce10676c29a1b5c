use std::sync::Arc;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::Connection;
use crate::sources::camera::FfmpegCamera;
use crate::sources::gpsd::GpsdSource;
use crate::supervisor::{self, Queues};

/// Runs one established connection to completion: log in, hand the queues to
/// the workers, sit out the connection's lifetime, stop the workers.
///
/// A login that fails or times out is abandoned without fuss - the caller's
/// reconnect loop takes it from there.
pub async fn connection_loop(connection: &Arc<Connection>, queues: &Queues, config: &Config) {
    let login = match connection.send_login(&config.device_id).await {
        Ok(future) => future,
        Err(e) => {
            debug!("login send failed: {:#}", e);
            return;
        }
    };
    if let Err(e) = login.wait(config.server.login_timeout()).await {
        debug!("login not acknowledged: {}", e);
        return;
    }
    info!("successful login");

    let workers = supervisor::start_workers(connection, queues, config);
    connection.wait_for_close().await;
    workers.stop().await;
}

/// Outer reconnect loop: connect, run, cool down, repeat - forever. Every
/// failure is logged and swallowed; this function never returns.
pub async fn serve(config: Arc<Config>, queues: Arc<Queues>) {
    info!("serving {}", config.server.address);
    loop {
        match Connection::connect(&config.server.address).await {
            Ok(connection) => {
                connection_loop(&connection, &queues, &config).await;
                connection.close();
            }
            Err(e) => warn!("connect to {} failed: {:#}", config.server.address, e),
        }
        sleep(config.server.cooldown()).await;
    }
}

/// Wires the sources, queues, consumers and the reconnect loop together and
/// runs them all. Only resolves if every task dies, which is to say: never.
pub async fn run(config: Config) {
    info!("starting trackgate for device {}", config.device_id);

    let config = Arc::new(config);
    let queues = Arc::new(Queues::new(&config));

    let gpsd = GpsdSource::new(config.gpsd.address.clone());
    let camera = FfmpegCamera::new(config.camera.path.clone(), config.camera.transport.clone());

    let handles = vec![
        tokio::spawn(serve(config.clone(), queues.clone())),
        tokio::spawn(supervisor::produce_keep_alives(
            queues.keep_alives.clone(),
            config.keep_alive.cooldown(),
        )),
        tokio::spawn(supervisor::produce_positions(queues.positions.clone(), gpsd)),
        tokio::spawn(supervisor::produce_snapshots(
            queues.snapshots.clone(),
            camera,
            config.snapshot.cooldown(),
        )),
    ];

    for handle in handles {
        let _ = handle.await;
    }
}

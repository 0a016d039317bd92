//! Controller protocol: `Content-Length` framed JSON over stdio.

mod protocol;
mod server;

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;

pub use protocol::{read_message, write_message, DapMessage, DapMessageContent};
pub use server::DapServer;

const PUMP_INTERVAL: Duration = Duration::from_millis(10);

/// Serve one client on stdin/stdout until it disconnects or closes stdin.
pub fn run_dap_mode(config: Config) -> io::Result<()> {
    info!(target: "step_debugger::dap", "DAP server starting");

    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("dap-reader".to_string())
        .spawn(move || {
            let stdin = io::stdin();
            let mut handle = stdin.lock();
            loop {
                match read_message(&mut handle) {
                    Ok(Some(msg)) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(target: "step_debugger::dap", "stdin closed");
                        break;
                    }
                    Err(err) => {
                        warn!(target: "step_debugger::dap", error = %err, "unreadable message");
                        break;
                    }
                }
            }
        })?;

    let mut server = DapServer::new(io::stdout(), config);
    loop {
        match rx.recv_timeout(PUMP_INTERVAL) {
            Ok(msg) => {
                if !server.handle(msg)? {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        server.pump()?;
    }

    info!(target: "step_debugger::dap", "DAP server exiting");
    Ok(())
}

use std::io::BufRead;
use std::println;
use std::thread;

use crate::command::Command;
use crate::log::*;
use crate::{submit_command, CURRENT_STATUS, STATUS_REPORT_MILLIS};
use embassy_time::Timer;

/// Read JSON command frames from stdin on a plain thread and queue them for
/// the control loop.
pub fn spawn_command_reader() -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("command-reader".into())
        .spawn(|| {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match Command::parse(&line) {
                    Ok(command) => {
                        debug!("Received command: {:?}", command);
                        submit_command(command);
                    }
                    Err(e) => warn!("Rejected command {:?}: {}", line.trim(), e),
                }
            }
            info!("Command input closed");
        })
}

/// Print the latest status as one JSON line per reporting period.
#[embassy_executor::task]
pub async fn status_task() {
    let Some(mut receiver) = CURRENT_STATUS.receiver() else {
        error!("No status receiver available");
        return;
    };

    loop {
        let status = receiver.get().await;
        match status.to_json() {
            Ok(json) => println!("{}", json),
            Err(_) => warn!("Status does not fit the JSON buffer"),
        }
        Timer::after_millis(STATUS_REPORT_MILLIS.into()).await;
    }
}

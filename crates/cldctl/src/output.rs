//! Console rendering of engine events

use cld_engine::{DeployEvent, EventLevel};

/// Spawn a background task printing events until the channel closes
pub fn spawn_printer(rx: async_channel::Receiver<DeployEvent>) -> smol::Task<()> {
    smol::spawn(async move {
        while let Ok(event) = rx.recv().await {
            print_event(&event);
        }
    })
}

fn print_event(event: &DeployEvent) {
    let level = match event.level {
        EventLevel::Debug => "DEBUG",
        EventLevel::Info => " INFO",
        EventLevel::Warn => " WARN",
        EventLevel::Error => "ERROR",
    };
    match (&event.resource, event.progress) {
        (Some(resource), Some(progress)) => {
            println!(
                "{} [{:>3}%] {} {}",
                level, progress, resource, event.message
            );
        }
        (Some(resource), None) => println!("{} {} {}", level, resource, event.message),
        (None, Some(progress)) => println!("{} [{:>3}%] {}", level, progress, event.message),
        (None, None) => println!("{} {}", level, event.message),
    }
}

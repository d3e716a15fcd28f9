// src/bin/controller_probe.rs - Connectivity check against the arm controller
use gesture_arm::config::ControlConfig;
use gesture_arm::joints::JointStore;
use gesture_arm::protocol::{format_command, ProtocolClient};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gesture_arm=debug".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match ControlConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                println!("✗ Failed to load config: {:#}", e);
                std::process::exit(2);
            }
        },
        None => ControlConfig::default(),
    };
    let addr = config.controller_addr();
    println!("Testing controller access at {}...\n", addr);

    match ProtocolClient::connect(&addr, config.connect_timeout(), config.response_timeout(), config.response_buffer_size) {
        Ok(mut client) => {
            println!("✓ Connected");

            let joints = JointStore::new(config.initial_pose);
            println!("  Sending initial pose: {}", format_command(&joints));
            let outcome = client.send_command(&joints);
            if outcome.is_confirmed() {
                println!("✓ Controller confirmed - PROTOCOL WORKING!");
            } else {
                println!("✗ Command not confirmed: {:?}", outcome);
                std::process::exit(1);
            }
        }
        Err(e) => {
            println!("✗ {}", e);
            println!("\nPossible causes:");
            println!("1. Controller program is not running");
            println!("2. Wrong host or port in the config");
            println!("3. Network route to the controller is down");
            std::process::exit(1);
        }
    }
}

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("ecprims {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: ecprims");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("ECPRIMS_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    let mut channels = Vec::new();
    if cfg!(target_os = "linux") {
        channels.push("dev-port");
    }
    if cfg!(windows) {
        channels.extend(["winring0", "crosec"]);
    }
    if cfg!(feature = "sim") {
        channels.extend(["sim", "sim-driver"]);
    }
    println!(
        "channels: {}",
        if channels.is_empty() {
            "none".to_string()
        } else {
            channels.join(", ")
        }
    );
    println!(
        "lock: {}",
        if cfg!(unix) {
            "flock"
        } else if cfg!(windows) {
            "named-mutex"
        } else {
            "none"
        }
    );

    Ok(SUCCESS)
}

#[macro_use]
extern crate log;
extern crate simplelog;

mod workload;

use std::env;
use std::process::ExitCode;

use dumbssd::config::*;
use dumbssd::SubmitMode;
use rand::prelude::*;
use simplelog::*;
use time::macros::format_description;
use workload::Exerciser;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn main() -> ExitCode {
    let log_cfg = ConfigBuilder::new()
        .set_time_format_custom(format_description!("[hour]:[minute]:[second].[subsecond]"))
        .build();

    let level = env_or("DUMBSSD_LOG", LevelFilter::Info);
    if let Err(e) = SimpleLogger::init(level, log_cfg) {
        eprintln!("logger init failed: {}", e);
    }

    let mode = match env::var("DUMBSSD_MODE").as_deref() {
        Ok("sync") => SubmitMode::Blocking,
        _ => SubmitMode::NonBlocking,
    };
    let seed = env_or("DUMBSSD_SEED", 7u64);

    match run(mode, seed) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(bad) => {
            error!("{} pages failed verification", bad);
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("exerciser aborted: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(mode: SubmitMode, seed: u64) -> dumbssd::Result<usize> {
    let mut fw = Exerciser::new(mode, seed)?;
    let max_lpn = fw.max_lpn();

    fw.precondition()?;
    info!("Drive preconditioned ({:?})", mode);

    let mut rng: SmallRng = SmallRng::seed_from_u64(seed);
    let mut bad = 0;

    for c in 0..4 {
        for _ in 0..=max_lpn / 4 {
            let lpn = rng.gen_range(0..=max_lpn);
            if !fw.verify(lpn)? {
                bad += 1;
            }
        }
        fw.rewrite_block(rng.gen_range(0..CHANNELS), rng.gen_range(0..BLOCKS))?;
        info!("Pass {} randomly read", c);
    }

    fw.report();
    Ok(bad)
}

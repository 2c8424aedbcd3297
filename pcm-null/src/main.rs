// SPDX-License-Identifier: Apache-2.0 or BSD-3-Clause

use std::process::exit;

use clap::Parser;
use pcm_null::{
    args::NullArgs,
    bench::{run_bench, BenchConfig},
};

fn main() {
    env_logger::init();

    let config = BenchConfig::from(NullArgs::parse());

    match run_bench(&config) {
        Ok(report) => {
            print!("{}", report.dump);
            println!("{report}");
        }
        Err(err) => {
            log::error!("{}: {}", config.name, err);
            exit(1);
        }
    }
}

// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;

use fleetrun::{
    cli::Cli,
    config::{ConfigFile, Settings},
    executor::Executor,
    reporter::{color_enabled, reporter_for},
    target::Target,
    utils::init_logging,
};

/// Exit code for configuration, usage and fatal errors.
const EXIT_FATAL: i32 = 1;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let file = ConfigFile::load(cli.options.configfile.as_deref()).await?;
    let settings = Arc::new(Settings::resolve(Some(&file), &cli.overrides())?);
    init_logging(&settings.log)?;
    tracing::debug!("Resolved settings: {:?}", settings);

    let Some(nodes) = cli.options.nodes.as_deref() else {
        bail!("Option '--nodes' must be specified");
    };
    let targets = Target::parse_list(nodes, &settings)?;
    if targets.iter().any(|t| t.params().insecure) {
        tracing::warn!("Host key and certificate verification is disabled");
    }
    let action = cli.action()?;

    let mut reporter = reporter_for(settings.format, std::io::stdout(), color_enabled());
    let executor = Executor::new(Arc::clone(&settings));
    match executor.run(&action, targets, reporter.as_mut()).await {
        Ok(summary) => Ok(summary.exit_code()),
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(EXIT_FATAL)
        }
    }
}

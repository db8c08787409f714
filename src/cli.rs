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

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::action::Action;
use crate::config::{CliOverrides, TransportSection};
use crate::utils::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "fleetrun",
    version,
    about = "Run commands, scripts and tasks on many hosts at once",
    long_about = "fleetrun dispatches one action to every node given with --nodes, over SSH, WinRM or a PCP agent.\nNodes run concurrently up to --concurrency; a failure on one node never stops the others.",
    after_help = "EXAMPLES:\n  Run a command:        fleetrun command run 'uptime' -n web1,web2\n  Run a local script:   fleetrun script run ./check.sh --verbose -n ssh://admin@db1\n  Run a task:           fleetrun task run package::install name=vim -n web1 --modulepath ./modules\n  Over WinRM:           fleetrun command run 'Get-Service' -n winrm://win1 -u Administrator -p secret\n\nExit codes: 0 (all nodes ok), 2 (any node failed), 1 (configuration or usage error)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub options: GlobalOptions,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a shell command line
    Command {
        #[command(subcommand)]
        action: CommandAction,
    },
    /// Upload and run a local script
    Script {
        #[command(subcommand)]
        action: ScriptAction,
    },
    /// Run a task from the module path
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CommandAction {
    Run {
        #[arg(help = "Command to execute on every node")]
        command: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScriptAction {
    Run {
        #[arg(help = "Local script to upload and execute")]
        script: PathBuf,

        #[arg(
            trailing_var_arg = true,
            allow_hyphen_values = true,
            help = "Arguments passed to the script"
        )]
        arguments: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum TaskAction {
    Run {
        #[arg(help = "Task name: 'module' or 'module::task'")]
        task: String,

        #[arg(help = "Task parameters as key=value pairs")]
        parameters: Vec<String>,

        #[arg(long, help = "Task parameters as a JSON object")]
        params: Option<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct GlobalOptions {
    #[arg(
        short = 'n',
        long,
        global = true,
        help = "Comma-separated list of nodes in [transport://][user@]host[:port] format"
    )]
    pub nodes: Option<String>,

    #[arg(short = 'u', long, global = true, help = "User to authenticate as")]
    pub user: Option<String>,

    #[arg(short = 'p', long, global = true, help = "Password to authenticate with")]
    pub password: Option<String>,

    #[arg(long, global = true, help = "Private SSH key to authenticate with")]
    pub private_key: Option<String>,

    #[arg(
        short = 'k',
        long,
        global = true,
        help = "Skip host key and certificate verification (insecure, testing only)"
    )]
    pub insecure: bool,

    #[arg(long, global = true, help = "Seconds allowed to establish a connection [default: 10]")]
    pub connect_timeout: Option<u64>,

    #[arg(
        long,
        global = true,
        help = "Seconds allowed per node for the remote work, cleanup excluded (0 for unlimited)"
    )]
    pub timeout: Option<u64>,

    #[arg(
        short = 'c',
        long,
        global = true,
        help = "Maximum number of nodes to run on at once [default: 100]"
    )]
    pub concurrency: Option<usize>,

    #[arg(long, global = true, help = "Transport for nodes without a scheme: ssh, winrm or pcp")]
    pub transport: Option<String>,

    #[arg(long, global = true, help = "Output format: human or json")]
    pub format: Option<String>,

    #[arg(long, global = true, help = "Directories to search for modules, separated like PATH")]
    pub modulepath: Option<String>,

    #[arg(long, global = true, help = "User to run as with privilege escalation")]
    pub run_as: Option<String>,

    #[arg(long, global = true, help = "Privilege escalation mechanism (only 'sudo')")]
    pub sudo: Option<String>,

    #[arg(long, global = true, help = "Password for privilege escalation")]
    pub sudo_password: Option<String>,

    #[arg(long, global = true, help = "Request a pseudo-terminal (ssh)")]
    pub tty: bool,

    #[arg(
        long,
        global = true,
        help = "Configuration file [default: ~/.config/fleetrun/config.yaml]"
    )]
    pub configfile: Option<PathBuf>,

    #[arg(short = 'v', long, global = true, help = "Show progress information")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Show debug information")]
    pub debug: bool,
}

impl Cli {
    /// The action requested by the subcommand.
    pub fn action(&self) -> Result<Action> {
        match &self.command {
            Commands::Command {
                action: CommandAction::Run { command },
            } => Ok(Action::command(command.clone())),
            Commands::Script {
                action: ScriptAction::Run { script, arguments },
            } => Ok(Action::script(script.clone(), arguments.clone())),
            Commands::Task {
                action:
                    TaskAction::Run {
                        task,
                        parameters,
                        params,
                    },
            } => Ok(Action::task(
                task.clone(),
                task_input(parameters, params.as_deref())?,
            )),
        }
    }

    pub fn overrides(&self) -> CliOverrides {
        let o = &self.options;
        CliOverrides {
            concurrency: o.concurrency,
            format: o.format.clone(),
            transport: o.transport.clone(),
            modulepath: o.modulepath.clone(),
            log_level: self.log_level(),
            transport_options: TransportSection {
                user: o.user.clone(),
                password: o.password.clone(),
                private_key: o.private_key.clone(),
                insecure: o.insecure.then_some(true),
                connect_timeout: o.connect_timeout,
                timeout: o.timeout,
                tty: o.tty.then_some(true),
                run_as: o.run_as.clone(),
                sudo: o.sudo.clone(),
                sudo_password: o.sudo_password.clone(),
                ..TransportSection::default()
            },
        }
    }

    /// `--debug` beats `--verbose`; neither leaves the config file in charge.
    pub fn log_level(&self) -> Option<LogLevel> {
        if self.options.debug {
            Some(LogLevel::Debug)
        } else if self.options.verbose {
            Some(LogLevel::Info)
        } else {
            None
        }
    }
}

/// Task input from `key=value` pairs or a `--params` JSON document, not both.
fn task_input(parameters: &[String], params: Option<&str>) -> Result<Value> {
    if let Some(json) = params {
        if !parameters.is_empty() {
            bail!("Parameters must be given either with --params or as key=value pairs, not both");
        }
        return serde_json::from_str(json).context("Could not parse --params as JSON");
    }

    let mut input = Map::new();
    for pair in parameters {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid parameter '{pair}': expected key=value");
        };
        if key.is_empty() {
            bail!("Invalid parameter '{pair}': the key is empty");
        }
        input.insert(key.to_string(), Value::String(value.to_string()));
    }
    Ok(Value::Object(input))
}

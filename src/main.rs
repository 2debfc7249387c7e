// ucentralctl - CLI for uCentral access-point fleet management
// Copyright (C) 2024 Mathias Uhl <mathiasuhl@gmx.de>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod cache;
mod client;
mod config;
mod devices;
mod dispatch;
mod model;
mod report;
mod session;

use crate::client::Scheme;
use crate::config::{Config, Scope, resolve, save};
use crate::dispatch::{CommandName, run_chain};
use crate::report::InfoType;
use anyhow::{Context, Result};
use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use std::io;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ucentralctl",
    version,
    about = "CLI for uCentral access-point fleet management",
    after_help = chain_help()
)]
struct Cli {
    #[arg(
        long,
        short = 'u',
        global = true,
        env = "UCENTRAL_USERNAME",
        help = "Username for the security service"
    )]
    username: Option<String>,

    #[arg(
        long,
        short = 'p',
        global = true,
        env = "UCENTRAL_PASSWORD",
        hide_env_values = true,
        help = "Password for the security service"
    )]
    password: Option<String>,

    #[arg(
        long,
        global = true,
        env = "UCENTRAL_SEC",
        value_name = "HOST:PORT",
        help = "Security service endpoint"
    )]
    sec: Option<String>,

    #[arg(
        long,
        global = true,
        value_enum,
        help = "URL scheme for every service (defaults to https)"
    )]
    scheme: Option<SchemeArg>,

    #[arg(long, global = true, help = "Accept invalid TLS certificates")]
    insecure: bool,

    #[arg(long, global = true, value_name = "NAME", help = "Author recorded on added notes")]
    note_author: Option<String>,

    #[arg(
        short,
        long,
        global = true,
        action = ArgAction::Count,
        help = "More log output (-v debug, -vv trace)"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Command chain, e.g. `getdevice <serial> interfaces reboot <serial>`
    #[arg(value_name = "COMMAND")]
    chain: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Persist the global connection flags to the chosen scope
    Configure {
        #[arg(
            long,
            value_enum,
            default_value_t = ScopeArg::User,
            help = "Where to write the config (local project dir or user config dir)"
        )]
        scope: ScopeArg,
    },
    /// Show current configuration (secrets masked)
    ConfigShow,
    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScopeArg {
    Local,
    User,
}

impl From<ScopeArg> for Scope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::Local => Scope::Local,
            ScopeArg::User => Scope::User,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemeArg {
    Https,
    Http,
}

impl From<SchemeArg> for Scheme {
    fn from(value: SchemeArg) -> Self {
        match value {
            SchemeArg::Https => Scheme::Https,
            SchemeArg::Http => Scheme::Http,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

fn chain_help() -> String {
    let mut help = String::from("Chain commands:\n");
    for name in CommandName::ALL {
        help.push_str(&format!("  {}\n", name.usage()));
    }
    let kinds: Vec<&str> = InfoType::ALL.iter().map(|kind| kind.as_str()).collect();
    help.push_str(&format!("\nInfo types: {}\n", kinds.join(", ")));
    help.push_str("\nSerial numbers are 12 characters. Commands run in order in a single session.");
    help
}

/// Raises verbosity for this crate only; dependencies stay at `info`.
fn log_directive(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    format!("info,ucentralctl={level}")
}

fn init_logging(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

impl Cli {
    /// Flags given on the command line or through the environment.
    fn overrides(&self) -> Config {
        Config {
            username: self.username.clone(),
            password: self.password.clone(),
            security_endpoint: self.sec.clone(),
            scheme: self.scheme.map(Scheme::from),
            insecure: self.insecure.then_some(true),
            note_author: self.note_author.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let cwd = std::env::current_dir().context("reading current directory")?;

    match &cli.command {
        Some(Commands::Configure { scope }) => {
            let existing = config::load_scope((*scope).into(), &cwd)?;
            let updated = config::merge(existing, cli.overrides());
            let path = save((*scope).into(), &updated, &cwd)?;
            println!("Saved configuration to {}", path.display());
        }
        Some(Commands::ConfigShow) => {
            let mut masked = config::merge(config::load(&cwd)?, cli.overrides());
            if masked.password.is_some() {
                masked.password = Some("*****".into());
            }
            println!("{}", serde_json::to_string_pretty(&masked)?);
        }
        Some(Commands::Completion { shell }) => {
            use clap_complete::{generate, shells};
            let mut cmd = Cli::command();
            let bin = cmd.get_name().to_string();
            match shell {
                CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin, &mut io::stdout()),
                CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin, &mut io::stdout()),
                CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin, &mut io::stdout()),
                CompletionShell::PowerShell => {
                    generate(shells::PowerShell, &mut cmd, bin, &mut io::stdout())
                }
            }
        }
        None if cli.chain.is_empty() => {
            Cli::command().print_help()?;
            println!();
        }
        None => {
            let effective = resolve(&cwd, cli.overrides())?;
            run_chain(&effective, &cli.chain, io::stdout().lock())
                .context("running command chain")?;
        }
    }

    Ok(())
}

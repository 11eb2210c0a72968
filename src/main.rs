// Copyright (C) 2026 Core Services Team This program is free software: you
// can redistribute it and/or modify it under the terms of the GNU General
// Public License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::sync::Arc;

use clap::Parser;
use eyre::{eyre, Context};
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;

use repofed_core::args::Args;
use repofed_core::auth::credentials::CredentialStore;
use repofed_core::auth::directory::NullDirectoryOracle;
use repofed_core::core::Core;
use repofed_core::repo::{load_repositories, RepoDescriptor, RepositorySource};
use repofed_core::security::{self, SecurityContext};
use repofed_core::transfer::NoopTransferManager;
use repofed_core::worker::EchoRequestHandler;

/// Stand-in for the real repository directory client: reads a JSON array of
/// repo descriptors from `<cred_dir>/repos.json` if present, otherwise
/// returns an empty fleet so the server still starts.
struct JsonFileRepositorySource {
    path: std::path::PathBuf,
}

impl RepositorySource for JsonFileRepositorySource {
    fn list_repositories(&self) -> Vec<RepoDescriptor> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::error!(path = ?self.path, error = ?e, "failed to parse repository directory file");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }
}

fn install_tracing(debug: bool) -> eyre::Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_ansi(true)
        .with_file(true)
        .with_target(false)
        .with_line_number(true)
        .with_thread_names(true)
        .with_span_events(FmtSpan::NONE)
        .with_max_level(if debug { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| eyre!("unable to configure logging: {e}"))
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    install_tracing(args.debug)?;

    let config = args.load_config()?;

    if args.generate_keypair {
        security::generate_and_save_keypair(&config.cred_dir)
            .with_context(|| format!("failed to generate keypair in {:?}", config.cred_dir))?;
        info!(cred_dir = ?config.cred_dir, "generated CURVE keypair, exiting");
        return Ok(());
    }

    let (public_key, private_key) = security::load_keypair(&config.cred_dir)
        .with_context(|| format!("failed to load keypair from {:?}", config.cred_dir))?;
    let security_ctx = SecurityContext::server(public_key, private_key);

    let repo_source = JsonFileRepositorySource {
        path: config.cred_dir.join("repos.json"),
    };
    let repos = load_repositories(&repo_source);
    info!(count = repos.len(), "loaded repository fleet");

    let credentials = CredentialStore::from_repositories(&repos);
    info!(count = credentials.len(), "built pre-authorized credential table");

    let core = Core::new(
        config.clone(),
        security_ctx,
        repos,
        credentials,
        Arc::new(NullDirectoryOracle),
        Arc::new(NoopTransferManager),
        Arc::new(EchoRequestHandler),
    );

    info!(port = config.port, insecure_port = config.insecure_port(), "starting server");
    let async_mode = !args.foreground;
    core.start(async_mode)?;
    if async_mode {
        core.wait();
    }

    Ok(())
}

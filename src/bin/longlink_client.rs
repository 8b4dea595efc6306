// Copyright 2025 jonefeewang@gmail.com
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

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use longlink::protocol::Command as MessageCommand;
use longlink::service::{setup_tracing, AppConfig, AppResult, Client, LoggingDispatcher};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// overrides `client.client_id`
    #[arg(long)]
    pub client_id: Option<String>,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    if std::env::var_os("RUST_LOG").is_none() {
        let level = match commandline.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }

    let config_path = commandline
        .conf
        .as_ref()
        .map_or_else(|| PathBuf::from("./conf.toml"), PathBuf::from);
    let mut config =
        AppConfig::from_sources(config_path.exists().then_some(config_path.as_path()))?;
    if let Some(client_id) = commandline.client_id {
        config.client.client_id = client_id;
    }

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let _log_guard = setup_tracing("logs", "longlink-client.log")?;

    rt.block_on(async move {
        let shutdown = CancellationToken::new();
        let (client, handle) =
            Client::new(Arc::new(config), Arc::new(LoggingDispatcher), shutdown.clone());
        let client_task = client.spawn();

        {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("received ctrl-c, shutting down");
                }
                shutdown.cancel();
            });
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => break,
                line = lines.next_line() => line,
            };
            match line {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => {
                    if let Err(e) = handle.send_payload(MessageCommand::PushData, line).await {
                        warn!("failed to send: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed, shutting down");
                    break;
                }
                Err(e) => {
                    error!("failed to read stdin: {}", e);
                    break;
                }
            }
        }
        handle.shutdown();

        if let Err(e) = client_task.await {
            error!("client task failed: {}", e);
        }
        Ok(())
    })
}

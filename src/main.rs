// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};

use playlist_sync::{
    EpisodePattern, NoopReporter, ProgressEvent, ProgressReporter, RawConfig, ReqwestClient,
    SharedProgressReporter, SshRemote, StartupError, SyncContext, SyncOptions, WorkingDirectory,
    YtDlp, logging, prepare, summary_message, sync_playlist,
};

// Emoji with fallback for terminals without Unicode support
static ARCHIVE: Emoji<'_, '_> = Emoji("🗄️  ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static TOOLS: Emoji<'_, '_> = Emoji("🧰 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static UPLOAD: Emoji<'_, '_> = Emoji("📤 ", "[^] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

const SEPARATOR: &str = "#######################";

/// Archive new playlist videos on a remote host
#[derive(Parser)]
#[command(name = "playlist-sync")]
#[command(about = "Download new playlist videos and upload them to a remote archive over SSH")]
#[command(version)]
struct Args {
    /// Playlist to archive
    #[arg(long, env = "PLAYLIST_ID")]
    playlist_id: Option<String>,

    /// File extension of the archived videos
    #[arg(long = "format", env = "PREFERRED_FORMAT")]
    format: Option<String>,

    /// Literal start of every archived episode file name
    #[arg(long, env = "TITLE_PREFIX")]
    title_prefix: Option<String>,

    /// Output template handed to the downloader
    #[arg(long, env = "OUTPUT_TEMPLATE")]
    output_template: Option<String>,

    /// Remote host holding the archive
    #[arg(long, env = "SSH_HOST")]
    ssh_host: Option<String>,

    /// SSH port of the remote host [default: 22]
    #[arg(long, env = "SSH_PORT")]
    ssh_port: Option<String>,

    /// User on the remote host
    #[arg(long, env = "SSH_USER")]
    ssh_user: Option<String>,

    /// Private key for the remote host
    #[arg(long, env = "SSH_KEY")]
    ssh_key: Option<PathBuf>,

    /// Password for the remote host
    #[arg(long, env = "SSH_PASSWORD", hide_env_values = true)]
    ssh_password: Option<String>,

    /// Archive directory on the remote host [default: the playlist id]
    #[arg(long, env = "SCP_PATH")]
    scp_path: Option<String>,

    /// Directory for installed tools [default: ~/.playlist-sync]
    #[arg(long, env = "APP_DIR")]
    app_dir: Option<PathBuf>,

    /// Keep the temporary working directory after the run
    #[arg(long)]
    keep_workdir: bool,

    /// Quiet mode - suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Print debug logs to stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn raw_config(&self) -> RawConfig {
        RawConfig {
            playlist_id: self.playlist_id.clone(),
            format: self.format.clone(),
            title_prefix: self.title_prefix.clone(),
            output_template: self.output_template.clone(),
            ssh_host: self.ssh_host.clone(),
            ssh_port: self.ssh_port.clone(),
            ssh_user: self.ssh_user.clone(),
            ssh_key: self.ssh_key.clone(),
            ssh_password: self.ssh_password.clone(),
            scp_path: self.scp_path.clone(),
            app_dir: self.app_dir.clone(),
        }
    }
}

/// Progress reporter printing one line per step, with a byte bar for tool downloads
struct TerminalReporter {
    install_bar: Mutex<Option<ProgressBar>>,
}

impl TerminalReporter {
    fn new() -> Self {
        Self {
            install_bar: Mutex::new(None),
        }
    }

    fn start_install_bar(&self) {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        *self.install_bar.lock().unwrap() = Some(bar);
    }

    fn finish_install_bar(&self) {
        if let Some(bar) = self.install_bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for TerminalReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::InstallingTool { tool } => {
                println!("{TOOLS}Installing {}...", tool.bold());
                self.start_install_bar();
            }

            ProgressEvent::InstallProgress {
                tool,
                bytes_downloaded,
                total_bytes,
            } => {
                if let Some(bar) = self.install_bar.lock().unwrap().as_ref() {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_downloaded);
                    bar.set_message(tool);
                }
            }

            ProgressEvent::ToolInstalled { tool, path } => {
                self.finish_install_bar();
                println!(
                    "{SUCCESS}Installed {} to {}",
                    tool.green(),
                    path.display().to_string().cyan()
                );
            }

            ProgressEvent::WorkingDirectoryCreated { path } => {
                println!(
                    "{FOLDER}Created temporary working directory at {}",
                    path.display().to_string().cyan()
                );
            }

            ProgressEvent::ListingRemote { host, path } => {
                println!("{SEARCH}Fetching existing episodes from {}:{}", host.cyan(), path.cyan());
            }

            ProgressEvent::RemoteListed { existing_count } => {
                println!(
                    "Fetched {} existing episodes.",
                    existing_count.to_string().yellow()
                );
            }

            ProgressEvent::PlaceholderCreated { episode } => {
                println!("Creating placeholder for episode {}", episode.dimmed());
            }

            ProgressEvent::DownloadStarted { playlist_url } => {
                println!("{DOWNLOAD}Downloading missing episodes from {}", playlist_url.cyan());
            }

            ProgressEvent::DownloadFinished { success, exit_code } => {
                if !success {
                    let code = exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string());
                    println!(
                        "{}",
                        format!("Downloader finished with errors (exit {code}), continuing")
                            .yellow()
                    );
                }
            }

            ProgressEvent::WorkingDirectoryScanned {
                ignored_artifacts, ..
            } => {
                if ignored_artifacts > 0 {
                    println!(
                        "Ignoring {} unfinished download files.",
                        ignored_artifacts.to_string().yellow()
                    );
                }
            }

            ProgressEvent::UploadStarting {
                episode,
                index,
                total,
            } => {
                if index == 0 {
                    println!("\n{UPLOAD}{}", "Uploading new episodes:".bold());
                    println!("{SEPARATOR}");
                }
                println!(
                    "[{}/{}] {}",
                    (index + 1).to_string().cyan(),
                    total.to_string().cyan(),
                    episode
                );
            }

            ProgressEvent::UploadCompleted { episode } => {
                println!("{SUCCESS}{}", episode.green());
                println!("{SEPARATOR}");
            }

            ProgressEvent::UploadFailed { episode, error } => {
                println!("{FAILURE}{} - {}", episode.red(), error.red());
                println!("{SEPARATOR}");
            }

            ProgressEvent::SyncCompleted { uploaded_count, .. } => {
                let summary = summary_message(uploaded_count);
                if uploaded_count > 0 {
                    println!("\n{PARTY}{}", summary.bold().green());
                } else {
                    println!("\n{}", summary.bold());
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    if !args.quiet {
        println!(
            "\n{}{} {}\n",
            ARCHIVE,
            "playlist-sync".bold().magenta(),
            "- Playlist Archiver".dimmed()
        );
    }

    let reporter: SharedProgressReporter = if args.quiet {
        NoopReporter::shared()
    } else {
        Arc::new(TerminalReporter::new())
    };

    let (config, tools) = match prepare(args.raw_config(), ReqwestClient::new(), reporter.clone())
        .await
    {
        Ok(prepared) => prepared,
        Err(StartupError::Config(e)) => {
            eprintln!("{} {}", "Configuration error:".red().bold(), e);
            eprintln!(
                "Make sure you specify SSH_HOST, SSH_PORT (default 22), SSH_USER as well as SSH_KEY or SSH_PASSWORD."
            );
            std::process::exit(1);
        }
        Err(StartupError::Provision(e)) => {
            return Err(e).context("Failed to provide required tools");
        }
    };

    let pattern = EpisodePattern::new(&config.playlist.title_prefix, &config.playlist.format)
        .context("Failed to build episode pattern")?;

    let workdir = WorkingDirectory::create().context("Failed to create working directory")?;
    reporter.report(ProgressEvent::WorkingDirectoryCreated {
        path: workdir.path().to_path_buf(),
    });

    let remote = SshRemote::new(&config.remote, args.verbose);
    let downloader = YtDlp::new(
        tools.downloader.clone(),
        tools.transcoder_dir(),
        &config.playlist.format,
    )
    .with_output_template(config.playlist.output_template.clone())
    .quiet(args.quiet);

    let ctx = SyncContext {
        lister: &remote,
        downloader: &downloader,
        uploader: &remote,
        reporter,
    };

    let result = sync_playlist(
        &ctx,
        &config.playlist.url(),
        &pattern,
        workdir.path(),
        &SyncOptions::default(),
    )
    .await;

    if args.keep_workdir {
        let path = workdir.keep();
        if !args.quiet {
            println!(
                "\n{FOLDER}Working directory kept at {}",
                path.display().to_string().cyan()
            );
        }
    } else {
        drop(workdir);
    }

    let result = result.context("Failed to sync playlist")?;

    if !result.failed_uploads.is_empty() {
        eprintln!("\n{}", "Failed uploads:".red().bold());
        for (episode, error) in &result.failed_uploads {
            eprintln!("  {}{} - {}", CROSS, episode.yellow(), error.dimmed());
        }
        std::process::exit(1);
    }

    Ok(())
}

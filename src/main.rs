use clap::{Parser, Subcommand};
use sitepress::compile::{self, CompileOptions};
use sitepress::config::Project;
use sitepress::server::{self, DEFAULT_IP, DEFAULT_PORT, ServeOptions};
use sitepress::{output, version_string};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitepress")]
#[command(about = "Serve a directory of sources as a website, or compile it")]
#[command(long_about = "\
Serve a directory of sources as a website, or compile it

Requests are resolved to one source file and rendered on demand:

  /             → index.md, index.shtml
  /about        → about.md, about.shtml, about/index.md, about/index.shtml
  /about.html   → about.md, about.shtml
  /style.css    → served as-is

Project structure:

  myproject/
  ├── site.toml                    # Config (optional): ignore, [globals], ...
  └── public/                      # Published tree (or the project root itself)
      ├── _layout.html             # Wraps Markdown pages ({{ yield }}, {{ title }})
      ├── index.md
      ├── nav.shtml                # <!--#include file=\"_menu.html\" -->
      ├── _menu.html               # Underscore = private, never published
      └── vendor/                  # Copied verbatim, never rendered

Set RUST_LOG to control logging (default: sitepress=info).")]
#[command(version = version_string())]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve a project, rendering on request and re-rendering on change
    Serve {
        /// Project directory
        #[arg(default_value = ".")]
        project: PathBuf,

        /// Address to listen on
        #[arg(long, default_value_t = DEFAULT_IP)]
        ip: IpAddr,

        /// Port to listen on
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Serve the site under this URL prefix
        #[arg(long)]
        mount: Option<String>,
    },
    /// Compile a project to a static directory
    Compile {
        /// Project directory
        #[arg(default_value = ".")]
        project: PathBuf,

        /// Output directory, relative to the project
        #[arg(default_value = compile::DEFAULT_OUTPUT_DIR)]
        output: PathBuf,

        /// Paths (relative to the public directory) copied without compiling
        #[arg(long, default_values = compile::DEFAULT_IGNORE.iter().copied())]
        ignore: Vec<String>,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Serve {
            project,
            ip,
            port,
            mount,
        } => {
            let project = Project::load(&project)?;
            let options = ServeOptions {
                addr: SocketAddr::new(ip, port),
                mount,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(server::serve(project, options, shutdown_signal()))?;
        }
        Command::Compile {
            project,
            output: output_dir,
            ignore,
            json,
        } => {
            let options = CompileOptions {
                output: output_dir,
                ignore,
            };
            let report = compile::compile(&project, &options)?;
            if json {
                println!("{}", output::format_compile_json(&report)?);
            } else {
                output::print_compile_output(&report);
            }
        }
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitepress=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

//! Isomer CLI
//!
//! Subcommands:
//!   serve    - run the HTTP server for a project
//!   render   - render one component to stdout (one-shot)
//!   new      - scaffold a new project

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use isomer::config::AppConfig;
use isomer::controller::ControllerRegistry;
use isomer::server::{serve, AppState};

#[derive(Debug, Parser)]
#[command(name = "isomer", version, about = "Isomorphic rendering bridge")]
struct Cli {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ISOMER_CONFIG_FILE", value_name = "PATH", global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Project root directory.
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
    /// Render one component and print the document to stdout.
    Render {
        /// Component identity, relative to the templates directory.
        component: String,

        /// Project root directory.
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Component data as a JSON object.
        #[arg(long)]
        data: Option<String>,

        /// Document metadata as a JSON object.
        #[arg(long)]
        doc: Option<String>,
    },
    /// Scaffold a new project.
    New {
        /// Project name; also the directory created.
        name: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { project } => {
            let config = AppConfig::load(&project, cli.config_file.as_deref())?;
            let addr = config.listen_addr();
            let state = AppState::from_config(&config, &project, ControllerRegistry::new())?;
            serve(state, &addr).await
        }
        Command::Render {
            component,
            project,
            data,
            doc,
        } => {
            let config = AppConfig::load(&project, cli.config_file.as_deref())?;
            let state = AppState::from_config(&config, &project, ControllerRegistry::new())?;

            let data = parse_mapping(data.as_deref(), "--data")?;
            let doc = parse_mapping(doc.as_deref(), "--doc")?;

            // The sandbox is synchronous; keep it off the async runtime.
            let renderer = state.renderer;
            let document = tokio::task::spawn_blocking(move || {
                renderer
                    .render(&component, data, doc)
                    .map(|result| renderer.render_document(&result))
            })
            .await??;

            println!("{document}");
            Ok(())
        }
        Command::New { name } => scaffold_project(&name),
    }
}

fn parse_mapping(raw: Option<&str>, flag: &str) -> Result<Option<serde_json::Value>> {
    raw.map(|text| {
        serde_json::from_str(text).map_err(|e| anyhow!("invalid JSON for {flag}: {e}"))
    })
    .transpose()
}

fn scaffold_project(name: &str) -> Result<()> {
    let root = Path::new(name);
    if root.exists() {
        return Err(anyhow!("directory `{name}` already exists"));
    }

    let templates = root.join("app/templates/home");
    std::fs::create_dir_all(&templates)
        .with_context(|| format!("could not create {}", templates.display()))?;
    std::fs::create_dir_all(root.join("app/assets"))?;

    std::fs::write(
        root.join("isomer.yml"),
        format!("name: {name}\ndev: true\nroot: home.index\n"),
    )?;

    std::fs::write(
        templates.join("index.svelte"),
        "<script>\n\
         \x20 let count = 0;\n\
         \x20 const doc = getDoc();\n\
         </script>\n\
         \n\
         <main>\n\
         \x20 <h1>{doc.title ?? 'Welcome'}</h1>\n\
         \x20 <p>count is {count}</p>\n\
         \x20 <button on:click={() => (count += 1)}>increment</button>\n\
         </main>\n\
         \n\
         <style>\n\
         \x20 main {\n\
         \x20   font-family: sans-serif;\n\
         \x20   max-width: 40rem;\n\
         \x20   margin: 2rem auto;\n\
         \x20 }\n\
         </style>\n",
    )?;

    println!("Created `{name}`. Next:");
    println!("  cd {name}");
    println!("  isomer serve");
    Ok(())
}

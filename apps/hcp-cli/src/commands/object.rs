use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use hcpsdk::Target;
use hcpsdk::objects::Objects;
use hcpsdk::pathbuilder::PathBuilder;

use super::{human_bytes, print_json};
use crate::config::CliConfig;

#[derive(Debug, Subcommand)]
pub enum ObjectCommand {
    /// Store a local file
    Put {
        /// Namespace path, `-` for a generated unique path
        path: String,
        file: PathBuf,
    },
    /// Read an object
    Get {
        path: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show object metadata
    Head { path: String },
    Delete { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    Mkdir { path: String },
    /// Generate a unique object path for a file name
    Unique { filename: String },
}

/// Namespace path (`docs/a.txt`, `/rest/docs/a.txt`) to an encoded REST path
fn rest_path(path: &str) -> String {
    let path = path.trim_start_matches('/');
    let path = path.strip_prefix("rest/").unwrap_or(path);
    let path = if path == "rest" { "" } else { path };
    PathBuilder::rest_path(path.trim_end_matches('/'))
}

fn path_builder(config: &CliConfig) -> PathBuilder {
    PathBuilder::new(&config.paths.initial_path).annotation(config.paths.annotation)
}

impl ObjectCommand {
    pub async fn run(self, target: &Target, config: &CliConfig) -> Result<()> {
        let objects = Objects::new(target.connection()?);
        match self {
            ObjectCommand::Put { path, file } => {
                let data = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("cannot read {}", file.display()))?;
                let (path, annotation) = if path == "-" {
                    let name = file
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let unique = path_builder(config).get_unique(&name)?;
                    (unique.full_path(), unique.annotation)
                } else {
                    (rest_path(&path), None)
                };
                let size = data.len() as u64;
                let metadata = objects.put_object(&path, data).await?;
                if let Some(annotation) = annotation {
                    objects
                        .put_annotation(&path, annotation)
                        .await
                        .with_context(|| format!("stored {path}, but not its annotation"))?;
                }
                eprintln!("stored {} at {path}", human_bytes(size));
                print_json(&metadata)
            }
            ObjectCommand::Get { path, output } => {
                let path = rest_path(&path);
                match output {
                    Some(file) => {
                        let mut out = tokio::fs::File::create(&file)
                            .await
                            .with_context(|| format!("cannot create {}", file.display()))?;
                        let total = objects.get_object_to(&path, &mut out).await?;
                        eprintln!("received {}", human_bytes(total));
                    }
                    None => {
                        let mut stdout = tokio::io::stdout();
                        objects.get_object_to(&path, &mut stdout).await?;
                    }
                }
                Ok(())
            }
            ObjectCommand::Head { path } => print_json(&objects.head_object(&rest_path(&path)).await?),
            ObjectCommand::Delete { path } => {
                objects.delete_object(&rest_path(&path)).await?;
                Ok(())
            }
            ObjectCommand::Ls { path } => {
                for entry in objects.list_directory(&rest_path(&path)).await? {
                    let size = entry.size.map(human_bytes).unwrap_or_default();
                    let ingested = entry
                        .ingest_time
                        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!("{:<10} {size:>10} {ingested:<19} {}", entry.kind.to_string(), entry.name);
                }
                Ok(())
            }
            ObjectCommand::Mkdir { path } => {
                objects.create_directory(&rest_path(&path)).await?;
                Ok(())
            }
            ObjectCommand::Unique { filename } => {
                let unique = path_builder(config).get_unique(&filename)?;
                print_json(&serde_json::json!({
                    "path": unique.path,
                    "object_name": unique.object_name,
                    "full_path": unique.full_path(),
                    "annotation": unique.annotation,
                }))
            }
        }
    }
}

use std::fs;

use camino::Utf8PathBuf;

use crate::api;
use crate::client::{CliError, KeystoneApiClient, send, send_unit};
use crate::println;

/// Manage signing policies (`spec.md` §6.3 `policy list|import|purge`).
#[derive(Clone, Debug, clap::Args)]
pub struct Policy {
    #[command(subcommand)]
    command: PolicyCommand,
}

#[derive(Clone, Debug, clap::Subcommand)]
enum PolicyCommand {
    /// List known policies
    List,
    /// Import a policy from a TOML file
    Import {
        /// The policy's name
        name: String,
        /// Path to a TOML policy document
        path: Utf8PathBuf,
    },
    /// Remove a policy, if no zone still references it
    Purge {
        /// The policy's name
        name: String,
    },
}

impl Policy {
    pub async fn execute(self, client: KeystoneApiClient) -> Result<(), CliError> {
        match self.command {
            PolicyCommand::List => {
                let result: api::PolicyListResult = send(client.get("policy/list")).await?;
                if result.policies.is_empty() {
                    println!("No policies configured");
                    return Ok(());
                }
                for name in &result.policies {
                    println!("{name}");
                }
                Ok(())
            }
            PolicyCommand::Import { name, path } => {
                let toml = fs::read_to_string(&path)
                    .map_err(|e| CliError::Usage(format!("reading {path}: {e}")))?;
                send_unit(client.post("policy/import").json(&api::PolicyImport {
                    name: name.clone().into_boxed_str(),
                    toml: toml.into_boxed_str(),
                }))
                .await?;
                println!("Imported policy {name}");
                Ok(())
            }
            PolicyCommand::Purge { name } => {
                send_unit(
                    client
                        .post("policy/purge")
                        .json(&api::PolicyPurge { name: name.clone().into_boxed_str() }),
                )
                .await?;
                println!("Purged policy {name}");
                Ok(())
            }
        }
    }
}

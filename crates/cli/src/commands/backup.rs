use crate::api;
use crate::client::{CliError, KeystoneApiClient, send};
use crate::println;

/// Mark keys' backup state (`spec.md` §6.3 `backup list|prepare|commit|
/// rollback`): `required_to_be_backed → requested → done`, or rolled back.
#[derive(Clone, Debug, clap::Args)]
pub struct Backup {
    #[command(subcommand)]
    command: BackupCommand,
}

#[derive(Clone, Debug, clap::Subcommand)]
enum BackupCommand {
    /// List keys by backup state
    List {
        /// Restrict to one HSM repository
        #[arg(long)]
        repository: Option<String>,
    },
    /// Mark required keys as requested
    Prepare {
        #[arg(long)]
        repository: Option<String>,
    },
    /// Mark requested keys as done
    Commit {
        #[arg(long)]
        repository: Option<String>,
    },
    /// Roll requested keys back to required
    Rollback {
        #[arg(long)]
        repository: Option<String>,
    },
}

impl Backup {
    pub async fn execute(self, client: KeystoneApiClient) -> Result<(), CliError> {
        match self.command {
            BackupCommand::List { repository } => {
                let result: api::BackupListResult = send(
                    client
                        .get("backup/list")
                        .query(&repository_query(&repository)),
                )
                .await?;
                if result.keys.is_empty() {
                    println!("No keys pending backup");
                    return Ok(());
                }
                for entry in &result.keys {
                    println!(
                        "{} {:>5} {} state={:?}",
                        entry.zone, entry.keytag, entry.locator, entry.state
                    );
                }
                Ok(())
            }
            BackupCommand::Prepare { repository } => {
                transition(client, "backup/prepare", repository, "prepared").await
            }
            BackupCommand::Commit { repository } => {
                transition(client, "backup/commit", repository, "committed").await
            }
            BackupCommand::Rollback { repository } => {
                transition(client, "backup/rollback", repository, "rolled back").await
            }
        }
    }
}

fn repository_query(repository: &Option<String>) -> Vec<(&'static str, &str)> {
    match repository {
        Some(r) => vec![("repository", r.as_str())],
        None => vec![],
    }
}

async fn transition(
    client: KeystoneApiClient,
    path: &str,
    repository: Option<String>,
    verb: &str,
) -> Result<(), CliError> {
    let result: api::BackupChangeResult = send(client.post(path).json(&api::BackupRepositorySelect {
        repository: repository.map(String::into_boxed_str),
    }))
    .await?;
    println!("{} key(s) {verb}", result.changed);
    Ok(())
}

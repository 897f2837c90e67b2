//! The `keystonectl` command surface (`spec.md` §6.3).

use crate::client::{CliError, KeystoneApiClient};

mod backup;
mod flush;
mod key;
mod policy;
mod queue;
mod update;
mod zone;

#[derive(Clone, Debug, clap::Subcommand)]
pub enum Command {
    /// Enumerate the schedule
    Queue(queue::Queue),
    /// Set all matching tasks' due time to now
    Flush(flush::Flush),
    /// Manage zones
    Zone(zone::Zone),
    /// Manage policies
    Policy(policy::Policy),
    /// Manage DNSSEC keys
    Key(key::Key),
    /// Manage key-material backups
    Backup(backup::Backup),
    /// Reload configuration from disk
    Update(update::Update),
}

impl Command {
    pub async fn execute(self, client: KeystoneApiClient) -> Result<(), CliError> {
        match self {
            Command::Queue(cmd) => cmd.execute(client).await,
            Command::Flush(cmd) => cmd.execute(client).await,
            Command::Zone(cmd) => cmd.execute(client).await,
            Command::Policy(cmd) => cmd.execute(client).await,
            Command::Key(cmd) => cmd.execute(client).await,
            Command::Backup(cmd) => cmd.execute(client).await,
            Command::Update(cmd) => cmd.execute(client).await,
        }
    }
}

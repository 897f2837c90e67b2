use crate::api;
use crate::client::{CliError, KeystoneApiClient, send};
use crate::println;

/// Reload configuration from disk and wake every zone's enforcer
/// (`spec.md` §6.3 `update conf|kasp|zonelist|all`).
#[derive(Clone, Debug, clap::Args)]
pub struct Update {
    #[arg(value_enum)]
    target: Target,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum Target {
    Conf,
    Kasp,
    Zonelist,
    All,
}

impl From<Target> for api::UpdateTarget {
    fn from(value: Target) -> Self {
        match value {
            Target::Conf => api::UpdateTarget::Conf,
            Target::Kasp => api::UpdateTarget::Kasp,
            Target::Zonelist => api::UpdateTarget::Zonelist,
            Target::All => api::UpdateTarget::All,
        }
    }
}

impl Update {
    pub async fn execute(self, client: KeystoneApiClient) -> Result<(), CliError> {
        let target: api::UpdateTarget = self.target.into();
        let result: api::UpdateResult = send(client.post("update").json(&target)).await?;
        println!(
            "{} polic{} changed, {} zone{} woken",
            result.policies_changed,
            if result.policies_changed == 1 { "y" } else { "ies" },
            result.zones_changed,
            if result.zones_changed == 1 { "" } else { "s" }
        );
        Ok(())
    }
}

use crate::api;
use crate::client::{CliError, KeystoneApiClient, send};
use crate::println;

/// Set all matching tasks' due time to now (`spec.md` §6.3 `flush [type]`).
#[derive(Clone, Debug, clap::Args)]
pub struct Flush {
    /// Only flush tasks of this type (e.g. "enforce", "sign"); omit to
    /// flush everything.
    #[arg(value_name = "TYPE")]
    ty: Option<String>,
}

impl Flush {
    pub async fn execute(self, client: KeystoneApiClient) -> Result<(), CliError> {
        let result: api::FlushResult = send(
            client.post("flush").json(&api::FlushRequest {
                ty: self.ty.map(String::into_boxed_str),
            }),
        )
        .await?;
        println!("Flushed {} task(s)", result.flushed);
        Ok(())
    }
}

use std::net::SocketAddr;

use camino::Utf8PathBuf;

use crate::api;
use crate::client::{CliError, KeystoneApiClient, send, send_unit};
use crate::println;

/// Manage zones (`spec.md` §6.3 `zone list|add|delete`).
#[derive(Clone, Debug, clap::Args)]
pub struct Zone {
    #[command(subcommand)]
    command: ZoneCommand,
}

#[derive(Clone, Debug, clap::Subcommand)]
enum ZoneCommand {
    /// List known zones
    List,
    /// Add a zone under management
    Add {
        /// The zone's apex name
        name: String,

        /// The signing policy to apply to this zone
        #[arg(long)]
        policy: String,

        /// Read the unsigned zone from a zonefile at this path
        #[arg(long, value_name = "PATH", conflicts_with = "dns")]
        zonefile: Option<Utf8PathBuf>,

        /// Read the unsigned zone via AXFR/IXFR from this address
        #[arg(long, value_name = "IP:PORT", conflicts_with = "zonefile")]
        dns: Option<SocketAddr>,
    },
    /// Remove a zone from management
    Delete {
        /// The zone's apex name
        name: String,
    },
}

impl Zone {
    pub async fn execute(self, client: KeystoneApiClient) -> Result<(), CliError> {
        match self.command {
            ZoneCommand::List => {
                let result: api::ZoneListResult = send(client.get("zone/list")).await?;
                if result.zones.is_empty() {
                    println!("No zones configured");
                    return Ok(());
                }
                for zone in &result.zones {
                    println!(
                        "{}  policy={} keys={} signconf_needs_writing={}",
                        zone.name, zone.policy, zone.key_count, zone.signconf_needs_writing
                    );
                }
                Ok(())
            }
            ZoneCommand::Add {
                name,
                policy,
                zonefile,
                dns,
            } => {
                let source = match (zonefile, dns) {
                    (Some(path), None) => api::ZoneSource::Zonefile {
                        path: path.into_string().into_boxed_str(),
                    },
                    (None, Some(addr)) => api::ZoneSource::Dns { addr },
                    _ => {
                        return Err(CliError::Usage(
                            "exactly one of --zonefile or --dns must be given".into(),
                        ));
                    }
                };
                send_unit(client.post("zone/add").json(&api::ZoneAdd {
                    name: name.clone().into_boxed_str(),
                    policy: policy.into_boxed_str(),
                    source,
                }))
                .await?;
                println!("Added zone {name}");
                Ok(())
            }
            ZoneCommand::Delete { name } => {
                send_unit(
                    client
                        .post("zone/delete")
                        .json(&api::ZoneDelete { name: name.clone().into_boxed_str() }),
                )
                .await?;
                println!("Deleted zone {name}");
                Ok(())
            }
        }
    }
}

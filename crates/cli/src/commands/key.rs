use crate::ansi;
use crate::api;
use crate::client::{CliError, KeystoneApiClient, send, send_unit};
use crate::println;

/// Manage DNSSEC keys (`spec.md` §6.3 `key generate|list|export|import|
/// ds-submit|ds-seen|ds-retract|ds-gone|rollover|purge`).
#[derive(Clone, Debug, clap::Args)]
pub struct Key {
    #[command(subcommand)]
    command: KeyCommand,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum Role {
    Ksk,
    #[default]
    Zsk,
    Csk,
}

impl From<Role> for api::KeyRoleInfo {
    fn from(value: Role) -> Self {
        match value {
            Role::Ksk => api::KeyRoleInfo::Ksk,
            Role::Zsk => api::KeyRoleInfo::Zsk,
            Role::Csk => api::KeyRoleInfo::Csk,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum RollRole {
    Ksk,
    Zsk,
    Csk,
}

impl From<RollRole> for api::RolloverRole {
    fn from(value: RollRole) -> Self {
        match value {
            RollRole::Ksk => api::RolloverRole::Ksk,
            RollRole::Zsk => api::RolloverRole::Zsk,
            RollRole::Csk => api::RolloverRole::Csk,
        }
    }
}

#[derive(Clone, Debug, clap::Subcommand)]
enum KeyCommand {
    /// Generate a fresh key in the zone's signing policy
    Generate {
        zone: String,
        #[arg(long, value_enum, default_value_t)]
        role: Role,
    },
    /// List a zone's keys and their per-record states
    List { zone: String },
    /// Export a key's DNSKEY resource record
    Export { zone: String, keytag: u16 },
    /// Adopt a key that already exists in the keystore
    Import {
        zone: String,
        locator: String,
        #[arg(long, value_enum, default_value_t)]
        role: Role,
    },
    /// Report that a DS record was handed to the parent zone operator
    #[command(name = "ds-submit")]
    DsSubmit { zone: String, keytag: u16 },
    /// Report that the DS record was observed published at the parent
    #[command(name = "ds-seen")]
    DsSeen { zone: String, keytag: u16 },
    /// Report that DS retraction was requested at the parent
    #[command(name = "ds-retract")]
    DsRetract { zone: String, keytag: u16 },
    /// Report that the DS record is confirmed gone from the parent
    #[command(name = "ds-gone")]
    DsGone { zone: String, keytag: u16 },
    /// Force a manual rollover of a key role
    Rollover {
        zone: String,
        #[arg(value_enum)]
        role: RollRole,
    },
    /// Remove a fully-retired key
    Purge { zone: String, keytag: u16 },
}

impl Key {
    pub async fn execute(self, client: KeystoneApiClient) -> Result<(), CliError> {
        match self.command {
            KeyCommand::Generate { zone, role } => {
                let result: api::KeyGenerateResult = send(client.post("key/generate").json(
                    &api::KeyGenerate {
                        zone: zone.into_boxed_str(),
                        role: role.into(),
                    },
                ))
                .await?;
                println!("Generated key {}", result.locator);
                Ok(())
            }
            KeyCommand::List { zone } => list(client, zone).await,
            KeyCommand::Export { zone, keytag } => {
                let result: api::KeyExportResult = send(
                    client
                        .get("key/export")
                        .query(&[("zone", zone.as_str()), ("keytag", &keytag.to_string())]),
                )
                .await?;
                println!("{}", result.dnskey_rr);
                Ok(())
            }
            KeyCommand::Import {
                zone,
                locator,
                role,
            } => {
                send_unit(client.post("key/import").json(&api::KeyImport {
                    zone: zone.clone().into_boxed_str(),
                    locator: locator.into_boxed_str(),
                    role: role.into(),
                }))
                .await?;
                println!("Imported key into {zone}");
                Ok(())
            }
            KeyCommand::DsSubmit { zone, keytag } => {
                ds_update(client, zone, keytag, api::DsObservation::Submit, "submitted").await
            }
            KeyCommand::DsSeen { zone, keytag } => {
                ds_update(client, zone, keytag, api::DsObservation::Seen, "seen").await
            }
            KeyCommand::DsRetract { zone, keytag } => {
                ds_update(client, zone, keytag, api::DsObservation::Retract, "retracted").await
            }
            KeyCommand::DsGone { zone, keytag } => {
                ds_update(client, zone, keytag, api::DsObservation::Gone, "gone").await
            }
            KeyCommand::Rollover { zone, role } => {
                send_unit(client.post("key/rollover").json(&api::KeyRollover {
                    zone: zone.clone().into_boxed_str(),
                    role: role.into(),
                }))
                .await?;
                println!("Scheduled manual rollover for {zone}");
                Ok(())
            }
            KeyCommand::Purge { zone, keytag } => {
                send_unit(client.post("key/purge").json(&api::KeyPurge {
                    zone: zone.clone().into_boxed_str(),
                    keytag,
                }))
                .await?;
                println!("Purged key {keytag} from {zone}");
                Ok(())
            }
        }
    }
}

async fn ds_update(
    client: KeystoneApiClient,
    zone: String,
    keytag: u16,
    observation: api::DsObservation,
    verb: &str,
) -> Result<(), CliError> {
    send_unit(client.post("key/ds").json(&api::KeyDsUpdate {
        zone: zone.clone().into_boxed_str(),
        keytag,
        observation,
    }))
    .await?;
    println!("Recorded DS {verb} for key {keytag} in {zone}");
    Ok(())
}

async fn list(client: KeystoneApiClient, zone: String) -> Result<(), CliError> {
    let result: api::KeyListResult = send(
        client.get("key/list").query(&[("zone", zone.as_str())]),
    )
    .await?;

    if result.keys.is_empty() {
        println!("No keys for zone {zone}");
        return Ok(());
    }

    for key in &result.keys {
        println!(
            "{}{:>5}{} {:<4} locator={} introducing={} ds_at_parent={:?}",
            ansi::BOLD,
            key.keytag,
            ansi::RESET,
            role_str(key.role),
            key.locator,
            key.introducing,
            key.ds_at_parent
        );
        println!(
            "       ds={:?} dnskey={:?} rrsig_dnskey={:?} rrsig={:?}",
            key.ds, key.dnskey, key.rrsig_dnskey, key.rrsig
        );
    }
    Ok(())
}

fn role_str(role: api::KeyRoleInfo) -> &'static str {
    match role {
        api::KeyRoleInfo::Ksk => "KSK",
        api::KeyRoleInfo::Zsk => "ZSK",
        api::KeyRoleInfo::Csk => "CSK",
    }
}

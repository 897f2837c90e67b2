use crate::ansi;
use crate::api;
use crate::client::{CliError, KeystoneApiClient, send};
use crate::println;

/// Enumerate the schedule (`spec.md` §6.3 `queue`).
#[derive(Clone, Debug, clap::Args)]
pub struct Queue;

impl Queue {
    pub async fn execute(self, client: KeystoneApiClient) -> Result<(), CliError> {
        let result: api::QueueListResult = send(client.get("queue")).await?;

        if result.tasks.is_empty() {
            println!("No tasks scheduled");
            return Ok(());
        }

        for task in &result.tasks {
            println!(
                "{}{}{} {} {}  due={} backoff={}s",
                ansi::BOLD,
                task.owner,
                ansi::RESET,
                task.class,
                task.ty,
                due_date(task.due_date),
                task.backoff
            );
        }
        Ok(())
    }
}

fn due_date(due: i64) -> String {
    jiff::Timestamp::from_second(due)
        .map(|ts| ts.round(jiff::Unit::Second).unwrap_or(ts).to_string())
        .unwrap_or_else(|_| due.to_string())
}

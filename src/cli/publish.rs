//! `pipstream publish`: append one event from the command line

use crate::server::{build_log, load_config};
use anyhow::{bail, Context, Result};
use clap::Args;
use pipstream_core::{ChannelKey, Fields, Publisher, PublisherConfig};

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Channel key, e.g. `workflow:wf-1` or `pip-ai:notifications`
    #[arg(long)]
    pub channel: String,

    /// Value stored in the entry's `event_type` field
    #[arg(long)]
    pub event_type: String,

    /// Entry fields as key=value pairs
    pub fields: Vec<String>,
}

pub async fn run(args: PublishArgs) -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;
    let channel = ChannelKey::new(args.channel.as_str()).context("Invalid channel key")?;
    let fields = parse_fields(&args.fields)?;

    let log = build_log(&config.log)?;
    let publisher = Publisher::new(
        log,
        PublisherConfig {
            max_len: config.log.max_len,
            best_effort: false,
        },
    );

    let id = publisher
        .publish(&channel, &args.event_type, fields)
        .await
        .context("Publish failed")?;
    match id {
        Some(id) => println!("{}", id),
        None => bail!("Publish was dropped"),
    }
    Ok(())
}

/// Split `key=value` pairs; the value may itself contain `=`.
pub fn parse_fields(pairs: &[String]) -> Result<Fields> {
    let mut fields = Fields::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Field '{}' is not key=value", pair);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("Field '{}' has an empty key", pair);
        }
        fields.insert(key.to_string(), value.to_string());
    }
    Ok(fields)
}

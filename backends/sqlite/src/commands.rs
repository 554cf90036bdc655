use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use habitat_core::{
    AccessControl, Message, MessageStore, Permission, ResourceKind, StoreOptions,
};
use realtime_api::messages_topic;
use tracing::info;

use crate::backend::SqliteBackend;
use crate::cli::Command;
use crate::config::Config;
use crate::habitats;

/// Execute one CLI command against the configured database.
pub async fn run(command: Command, cfg: &Config) -> Result<()> {
    let backend = Arc::new(SqliteBackend::open(&cfg.db_path)?);
    let access = AccessControl::new(backend.clone(), cfg.access_config());

    match command {
        Command::Init => {
            println!("database ready at {}", cfg.db_path.display());
        }
        Command::AddUser {
            id,
            display_name,
            avatar_url,
        } => {
            let user = habitats::add_user(&*backend.conn()?, &id, &display_name, avatar_url.as_deref())?;
            println!("{}", serde_json::to_string(&user)?);
        }
        Command::CreateHabitat {
            name,
            owner,
            public,
        } => {
            let habitat = habitats::create_habitat(&*backend.conn()?, &name, &owner, public)?;
            info!(habitat_id = %habitat.id, owner = %habitat.owner_id, "habitat created");
            println!("{}", habitat.id);
        }
        Command::Join { habitat, user, by } => {
            let actor = by.unwrap_or_else(|| user.clone());
            let needed = if actor == user {
                Permission::ReadHabitat
            } else {
                Permission::ManageMembers
            };
            access
                .validate_access(&actor, &habitat, needed, ResourceKind::Habitat)
                .await?;
            habitats::add_member(&*backend.conn()?, &habitat, &user)?;
            println!("{user} joined {habitat}");
        }
        Command::CreateResource {
            habitat,
            kind,
            user,
            title,
        } => {
            let needed = match kind {
                ResourceKind::Discussion => Permission::CreateDiscussion,
                ResourceKind::Poll => Permission::CreatePoll,
                ResourceKind::WatchParty => Permission::CreateWatchParty,
                ResourceKind::Habitat | ResourceKind::Message => {
                    anyhow::bail!("unsupported_kind")
                }
            };
            access
                .validate_access(&user, &habitat, needed, ResourceKind::Habitat)
                .await?;
            let id = habitats::create_sub_resource(&*backend.conn()?, kind, &habitat, &user, &title)?;
            println!("{id}");
        }
        Command::Messages {
            habitat,
            user,
            pages,
        } => {
            access
                .validate_access(&user, &habitat, Permission::ReadHabitat, ResourceKind::Habitat)
                .await?;
            let store = open_store(&backend, &habitat, &user, cfg.store_options()).await?;
            for _ in 1..pages {
                if !store.has_more() {
                    break;
                }
                store.load_more().await;
                if let Some(e) = store.error() {
                    anyhow::bail!(e);
                }
            }
            for message in store.messages() {
                println!("{}", format_message(&message));
            }
        }
        Command::Send { habitat, user, text } => {
            access
                .validate_access(&user, &habitat, Permission::SendMessage, ResourceKind::Habitat)
                .await?;
            let store = open_store(&backend, &habitat, &user, cfg.store_options()).await?;
            let message = store.send(&text).await?;
            println!("{}", message.id);
        }
        Command::Delete { message, user } => {
            access
                .validate_access(&user, &message, Permission::DeleteMessage, ResourceKind::Message)
                .await?;
            let sub = habitats::get_sub_resource(&*backend.conn()?, &message, ResourceKind::Message)?
                .context("message not found")?;
            let store = open_store(&backend, &sub.container_id, &user, cfg.store_options()).await?;
            store.delete_message(&message).await?;
            println!("deleted {message}");
        }
        Command::Check {
            user,
            resource,
            permission,
            kind,
        } => {
            let granted = access.check_permission(&user, &resource, permission, kind).await;
            println!("{granted}");
        }
        Command::Explain {
            user,
            resource,
            permission,
            kind,
        } => {
            let decision = access
                .get_permission_result(&user, &resource, permission, kind)
                .await;
            println!("{}", serde_json::to_string_pretty(&decision)?);
        }
        Command::Watch { habitat, user } => {
            access
                .validate_access(&user, &habitat, Permission::ReadHabitat, ResourceKind::Habitat)
                .await?;
            let mut options = cfg.store_options();
            options.auto_refresh = true;
            let store = open_store(&backend, &habitat, &user, options).await?;
            store.attach_feed(backend.feed().subscribe(&messages_topic(&habitat)));
            watch(&store, Duration::from_millis(cfg.refresh_interval_ms)).await?;
            store.dispose();
        }
    }
    Ok(())
}

async fn open_store(
    backend: &Arc<SqliteBackend>,
    habitat: &str,
    user: &str,
    options: StoreOptions,
) -> Result<MessageStore> {
    let store = MessageStore::open(Some(habitat), Some(user), backend.clone(), options).await;
    if let Some(e) = store.error() {
        anyhow::bail!(e);
    }
    Ok(store)
}

/// Print new messages as they show up until Ctrl+C.
async fn watch(store: &MessageStore, every: Duration) -> Result<()> {
    let mut seen: Vec<String> = Vec::new();
    let mut tick = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = tick.tick() => {
                let messages = store.messages();
                for message in messages.iter().rev() {
                    if !seen.contains(&message.id) {
                        println!("{}", format_message(message));
                    }
                }
                seen = messages.into_iter().map(|m| m.id).collect();
            }
        }
    }
}

fn format_message(message: &Message) -> String {
    let author = message
        .author_profile
        .as_ref()
        .map(|p| p.display_name.as_str())
        .unwrap_or(message.author_id.as_str());
    format!(
        "{} [{}] {}: {}",
        message.created_at, message.id, author, message.content
    )
}

//! Scenario harness
//!
//! Wires the engine to a chosen store backend and walks one end-to-end
//! scenario: room creation, channels, an invite join with its announcement,
//! quota rejections, and a retention sweep. Useful for eyeballing engine
//! behavior against each adapter without an HTTP layer.

use anyhow::{bail, Result};
use clap::Parser;
use std::sync::Arc;

use atrium_core::artifact::{FilePayload, MemoryObjectStore, UploadCoordinator};
use atrium_core::core_room::{ChannelKind, Role, RoomQuotas, Timestamp, UserId};
use atrium_core::engine::{EngineError, RoomEngine};
use atrium_core::identity::LocalIdentity;
use atrium_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use atrium_core::store::{DocStore, MemoryStore, RoomStore, SqlStore};

#[derive(Parser, Debug)]
#[command(name = "test-harness")]
#[command(about = "Atrium engine scenario harness", long_about = None)]
struct Args {
    /// Store backend: memory, sql or doc
    #[arg(long, default_value = "memory")]
    backend: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = LogLevel::from_str(&args.log_level)
        .ok_or_else(|| anyhow::anyhow!("unknown log level: {}", args.log_level))?;
    init_logging_with_config(LogConfig::new(level))?;
    atrium_core::metrics::describe();

    let store: Arc<dyn RoomStore> = match args.backend.as_str() {
        "memory" => Arc::new(MemoryStore::new()),
        "sql" => Arc::new(SqlStore::memory()?),
        "doc" => Arc::new(DocStore::memory()?),
        other => bail!("unknown backend: {other}"),
    };

    let identity = Arc::new(LocalIdentity::new());
    identity.register(UserId::new("alice"), "token-alice", "Alice", true);
    identity.register(UserId::new("bob"), "token-bob", "Bob", true);
    identity.register(UserId::new("carol"), "token-carol", "Carol", false);

    let blobs = Arc::new(MemoryObjectStore::new());
    let engine = RoomEngine::new(store, UploadCoordinator::new(blobs), identity);

    run_scenario(&engine).await?;
    println!("scenario completed against the {} backend", args.backend);
    Ok(())
}

async fn run_scenario(engine: &RoomEngine) -> Result<()> {
    let alice = engine.authenticate("token-alice").await?;
    let bob = engine.authenticate("token-bob").await?;
    let carol = UserId::new("carol");

    let quotas = RoomQuotas {
        max_users: 3,
        max_channels: 2,
        ..RoomQuotas::default()
    };
    let room = engine
        .create_room(
            &alice,
            "atrium-demo".to_string(),
            "demos".to_string(),
            quotas,
            Some(FilePayload::new("avatar.png", vec![0xAB; 512])),
        )
        .await?;
    println!("created room {} ({})", room.name, room.id);

    let general = engine
        .create_channel(&alice, &room.id, "general".to_string(), ChannelKind::Text, None)
        .await?;
    engine
        .create_channel(
            &alice,
            &room.id,
            "news".to_string(),
            ChannelKind::Announcement,
            None,
        )
        .await?;

    // The channel quota holds: a third channel is rejected
    match engine
        .create_channel(&alice, &room.id, "extra".to_string(), ChannelKind::Text, None)
        .await
    {
        Err(EngineError::ExceedsRoomChannelCount) => {
            println!("third channel rejected by the channel quota")
        }
        other => bail!("expected a channel-quota rejection, got {other:?}"),
    }

    let invite = engine.create_invite(&alice, &room.id, None).await?;
    engine.join_by_invite(&bob, &invite.code).await?;
    println!("bob joined via invite {}", invite.code);

    // carol's email is unverified
    match engine.join_by_invite(&carol, &invite.code).await {
        Err(EngineError::VerifiedEmailRequired) => {
            println!("carol rejected until her email is verified")
        }
        other => bail!("expected a verification rejection, got {other:?}"),
    }

    engine
        .change_member_role(&alice, &room.id, &bob, Role::Moderator)
        .await?;

    let message = engine
        .post_message(
            &alice,
            &general.id,
            "welcome everyone".to_string(),
            Some(FilePayload::new("agenda.txt", b"1. say hi".to_vec())),
        )
        .await?;
    engine
        .edit_message(&bob, &message.id, "welcome, everyone!".to_string())
        .await?;
    println!("bob moderated alice's message");

    let announcements = engine.store().channel_messages(&general.id).await?;
    println!("{} messages in #general", announcements.len());

    let report = engine.sweep_room(&room.id, Timestamp::now()).await?;
    println!(
        "retention sweep removed {} messages and {} files",
        report.messages_removed, report.files_removed
    );

    engine.destroy_room(&alice, &room.id).await?;
    println!("room destroyed, artifacts cleaned up");
    Ok(())
}

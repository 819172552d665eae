//! Gateway event translation.
//!
//! Serenity `FullEvent`s are resolved to plain [`LifecycleEvent`]s here and
//! handed to the synchronization pipeline on their own task, so a slow
//! embed/store round-trip never blocks the gateway loop. Resolution
//! failures drop only the event that failed.

use crate::sync::{AttachmentRef, LifecycleEvent, SourceItem, SourceKind, SyncPipeline};
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, error};

pub async fn dispatch(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::ThreadCreate { thread } => {
            if let Some(event) = thread_created(ctx, thread).await {
                spawn_sync(data.pipeline.clone(), event);
            }
        }
        serenity::FullEvent::MessageUpdate { event, .. } => {
            if let Some(event) = message_updated(ctx, event).await {
                spawn_sync(data.pipeline.clone(), event);
            }
        }
        serenity::FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            ..
        } => {
            if let Some(event) = message_deleted(ctx, *channel_id, *deleted_message_id).await {
                spawn_sync(data.pipeline.clone(), event);
            }
        }
        serenity::FullEvent::ThreadDelete {
            thread,
            full_thread_data,
        } => {
            if let Some(event) = thread_deleted(thread, full_thread_data.as_ref()) {
                spawn_sync(data.pipeline.clone(), event);
            }
        }
        _ => {}
    }
    Ok(())
}

fn spawn_sync(pipeline: Arc<SyncPipeline>, event: LifecycleEvent) {
    tokio::spawn(async move {
        if let Err(e) = pipeline.handle(event).await {
            error!("synchronization failed: {}", e);
        }
    });
}

fn is_thread(kind: serenity::ChannelType) -> bool {
    matches!(
        kind,
        serenity::ChannelType::PublicThread | serenity::ChannelType::PrivateThread
    )
}

fn map_attachments(attachments: &[serenity::Attachment]) -> Vec<AttachmentRef> {
    attachments
        .iter()
        .map(|attachment| AttachmentRef {
            id: attachment.id.to_string(),
            name: attachment.filename.clone(),
            url: attachment.url.clone(),
            content_type: attachment.content_type.clone(),
        })
        .collect()
}

/// A new thread: its root message (sharing the thread's id) is the source
/// item, synchronized under the thread's parent channel.
async fn thread_created(
    ctx: &serenity::Context,
    thread: &serenity::GuildChannel,
) -> Option<LifecycleEvent> {
    if !is_thread(thread.kind) {
        return None;
    }
    let parent_id = thread.parent_id?.to_string();

    let message = match thread
        .id
        .message(&ctx.http, serenity::MessageId::new(thread.id.get()))
        .await
    {
        Ok(message) => message,
        Err(e) => {
            error!("cant find a message from thread with id {}: {}", thread.id, e);
            return None;
        }
    };

    Some(LifecycleEvent::Created(SourceItem {
        kind: SourceKind::Thread,
        parent_id: message.id.to_string(),
        channel_id: parent_id,
        content: message.content.clone(),
        attachments: map_attachments(&message.attachments),
    }))
}

async fn message_updated(
    ctx: &serenity::Context,
    event: &serenity::MessageUpdateEvent,
) -> Option<LifecycleEvent> {
    // Update payloads can be partial; fetch the fresh message.
    let message = match event.channel_id.message(&ctx.http, event.id).await {
        Ok(message) => message,
        Err(e) => {
            error!("cant fetch edited message {}: {}", event.id, e);
            return None;
        }
    };

    let channel = resolve_thread(ctx, message.channel_id).await?;
    let parent_id = channel.parent_id?.to_string();
    debug!("changes detected in message with id {}", message.id);

    Some(LifecycleEvent::Edited(SourceItem {
        kind: SourceKind::Message,
        parent_id: message.id.to_string(),
        channel_id: parent_id,
        content: message.content.clone(),
        attachments: map_attachments(&message.attachments),
    }))
}

async fn message_deleted(
    ctx: &serenity::Context,
    channel_id: serenity::ChannelId,
    message_id: serenity::MessageId,
) -> Option<LifecycleEvent> {
    let channel = resolve_thread(ctx, channel_id).await?;
    let parent_id = channel.parent_id?.to_string();

    Some(LifecycleEvent::Deleted {
        kind: SourceKind::Message,
        parent_id: message_id.to_string(),
        channel_id: parent_id,
    })
}

fn thread_deleted(
    thread: &serenity::PartialGuildChannel,
    full_thread_data: Option<&serenity::GuildChannel>,
) -> Option<LifecycleEvent> {
    // Without the cached thread we cannot resolve the parent channel for
    // gating; drop the event rather than guess.
    let Some(parent_id) = full_thread_data.and_then(|channel| channel.parent_id) else {
        debug!("thread {} deleted without cached parent, skipping", thread.id);
        return None;
    };

    Some(LifecycleEvent::Deleted {
        kind: SourceKind::Thread,
        parent_id: thread.id.to_string(),
        channel_id: parent_id.to_string(),
    })
}

/// Resolves a channel id to its guild channel when it is a thread.
async fn resolve_thread(
    ctx: &serenity::Context,
    channel_id: serenity::ChannelId,
) -> Option<serenity::GuildChannel> {
    match channel_id.to_channel(ctx).await {
        Ok(serenity::Channel::Guild(channel)) if is_thread(channel.kind) => Some(channel),
        Ok(_) => None,
        Err(e) => {
            debug!("cant resolve channel {}: {}", channel_id, e);
            None
        }
    }
}

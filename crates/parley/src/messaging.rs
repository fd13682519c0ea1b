// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parley instances|inbox|thread|send|watch` command implementations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use colored::Colorize;
use parley_core::types::{
    ChannelInstance, ConnectivityStatus, Conversation, DeliveryStatus, MediaKind, Message,
    MessageDirection,
};
use parley_core::{InstanceId, MessageId, ParleyError};
use parley_messaging::{ActiveThread, MessagingSession, OutboundMedia, ProbeState, SyncNotice};
use tracing::debug;

/// What `parley send` carries.
#[derive(Debug)]
pub enum Outgoing {
    Text(String),
    Image(PathBuf),
    Document(PathBuf),
    Audio(PathBuf),
}

/// MIME type for a media file, from its extension.
pub fn mime_for(kind: MediaKind, path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match (kind, ext.as_str()) {
        (MediaKind::Image, "jpg" | "jpeg") => "image/jpeg",
        (MediaKind::Image, "png") => "image/png",
        (MediaKind::Image, "webp") => "image/webp",
        (MediaKind::Document, "pdf") => "application/pdf",
        (MediaKind::Document, "doc") => "application/msword",
        (MediaKind::Document, "docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        (MediaKind::Document, "xls") => "application/vnd.ms-excel",
        (MediaKind::Document, "xlsx") => {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        }
        (MediaKind::Document, "txt") => "text/plain",
        (MediaKind::Audio, "ogg" | "opus") => "audio/ogg;codecs=opus",
        (MediaKind::Audio, "webm") => "audio/webm;codecs=opus",
        (MediaKind::Audio, "m4a" | "mp4") => "audio/mp4",
        (MediaKind::Audio, "mp3") => "audio/mpeg",
        _ => return None,
    };
    Some(mime)
}

async fn load_media(kind: MediaKind, path: &Path) -> Result<OutboundMedia, ParleyError> {
    let mime = mime_for(kind, path).ok_or_else(|| ParleyError::MediaRejected {
        message: format!("Unsupported {kind} file: {}", path.display()),
    })?;
    let bytes = tokio::fs::read(path).await.map_err(|e| ParleyError::MediaRejected {
        message: format!("Could not read {}: {e}", path.display()),
    })?;
    let mut media = OutboundMedia::new(kind, bytes, mime);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        media = media.with_file_name(name);
    }
    Ok(media)
}

fn connectivity_label(status: ConnectivityStatus, use_color: bool) -> String {
    let text = status.to_string();
    if !use_color {
        return text;
    }
    match status {
        ConnectivityStatus::Connected => text.green().to_string(),
        ConnectivityStatus::Disconnected => text.red().to_string(),
        ConnectivityStatus::Unknown => text.yellow().to_string(),
    }
}

fn probe_label(state: ProbeState, use_color: bool) -> String {
    match state {
        ProbeState::Checking => "checking".to_string(),
        ProbeState::Verified(status) => connectivity_label(status, use_color),
    }
}

fn status_label(status: DeliveryStatus, use_color: bool) -> String {
    let text = status.to_string();
    if use_color && status == DeliveryStatus::Failed {
        return text.red().to_string();
    }
    text
}

/// One printable line for a message.
fn render_message(message: &Message, use_color: bool) -> String {
    let time = message.created_at.format("%d/%m %H:%M");
    let arrow = match message.direction {
        MessageDirection::Inbound => "<-",
        MessageDirection::Outbound => "->",
    };
    let mut body = match (&message.media_path, &message.text) {
        (Some(path), Some(caption)) => format!("[{}] {path} {caption}", message.kind),
        (Some(path), None) => format!("[{}] {path}", message.kind),
        (None, Some(text)) if !message.kind.is_media() => text.clone(),
        (None, text) => format!("[{}] {}", message.kind, text.as_deref().unwrap_or_default()),
    };
    if let Some(detail) = &message.failure_detail {
        body.push_str(&format!(" ({detail})"));
    }
    let status = match message.direction {
        MessageDirection::Outbound => format!(" [{}]", status_label(message.status, use_color)),
        MessageDirection::Inbound => String::new(),
    };
    format!("  {time} {arrow} {body}{status}")
}

/// A sync problem, printed between thread lines without stopping the watch.
fn render_notice(notice: &SyncNotice, use_color: bool) -> String {
    let time = notice.at.format("%H:%M:%S");
    if use_color {
        format!("  {time} {} {}", "!".yellow(), notice.message.yellow())
    } else {
        format!("  {time} ! {}", notice.message)
    }
}

fn print_thread_header(thread: &ActiveThread, session: &MessagingSession, use_color: bool) {
    let label = instance_label(&thread.instances, &thread.conversation.channel_instance_id);
    let title = format!(
        "{} via {label}",
        display_name(&thread.conversation)
    );
    if use_color {
        println!("  {}", title.bold());
    } else {
        println!("  {title}");
    }
    let switcher = session.switcher();
    if !switcher.is_empty() {
        let entries: Vec<String> = switcher
            .iter()
            .map(|e| {
                let marker = if e.conversation_id == thread.conversation.id {
                    "*"
                } else {
                    " "
                };
                format!("{marker}{} ({})", e.label, probe_label(e.state, use_color))
            })
            .collect();
        println!("  also on: {}", entries.join("  "));
    }
    println!("  {}", "-".repeat(50));
}

fn instance_label(instances: &[ChannelInstance], id: &InstanceId) -> String {
    instances
        .iter()
        .find(|i| &i.id == id)
        .map(|i| i.label.clone())
        .unwrap_or_else(|| id.to_string())
}

fn display_name(conversation: &Conversation) -> String {
    match &conversation.counterparty_name {
        Some(name) => format!("{name} (+{})", conversation.counterparty_address),
        None => format!("+{}", conversation.counterparty_address),
    }
}

/// Run `parley instances`.
pub async fn run_instances(
    session: &MessagingSession,
    verify: bool,
    use_color: bool,
) -> Result<(), ParleyError> {
    let instances = session.instances(verify).await?;
    if instances.is_empty() {
        println!("  No channel instances configured.");
        return Ok(());
    }
    println!();
    for instance in &instances {
        let status = if verify {
            connectivity_label(instance.verified, use_color)
        } else if instance.declared_connected {
            "declared connected".to_string()
        } else {
            "declared disconnected".to_string()
        };
        println!(
            "  {:<20} +{:<15} {:<14} {}",
            instance.label, instance.address, status, instance.id
        );
    }
    println!();
    Ok(())
}

/// Run `parley inbox`.
pub async fn run_inbox(
    session: &MessagingSession,
    filter: Option<&str>,
    use_color: bool,
) -> Result<(), ParleyError> {
    let view = session.inbox(filter).await?;
    let instances = session.instances(false).await?;
    println!();
    for conversation in &view.conversations {
        let unread = if conversation.unread_count > 0 {
            let badge = format!("({})", conversation.unread_count);
            if use_color {
                badge.green().bold().to_string()
            } else {
                badge
            }
        } else {
            String::new()
        };
        println!(
            "  {:<36} {:<16} {} {unread}",
            display_name(conversation),
            instance_label(&instances, &conversation.channel_instance_id),
            conversation.last_activity_at.format("%d/%m %H:%M"),
        );
    }
    if view.conversations.is_empty() {
        println!("  No conversations.");
    }
    println!();
    println!("  {} unread", view.total_unread);
    Ok(())
}

/// Run `parley thread`.
pub async fn run_thread(
    session: &MessagingSession,
    address: &str,
    instance: Option<&str>,
    use_color: bool,
) -> Result<(), ParleyError> {
    let requested = instance.map(InstanceId::from);
    let thread = session.open(address, requested.as_ref()).await?;
    let snapshot = session.sync().refresh().await?;

    println!();
    print_thread_header(&thread, session, use_color);
    match snapshot {
        Some(snapshot) if !snapshot.messages.is_empty() => {
            for message in &snapshot.messages {
                println!("{}", render_message(message, use_color));
            }
        }
        _ => println!("  No messages yet."),
    }
    println!();
    Ok(())
}

/// Run `parley send`.
///
/// Starts (or resumes) the conversation on the requested instance, then
/// sends one text or media message.
pub async fn run_send(
    session: &MessagingSession,
    address: &str,
    instance: &str,
    outgoing: Outgoing,
    caption: Option<String>,
) -> Result<(), ParleyError> {
    let media = match &outgoing {
        Outgoing::Text(_) => None,
        Outgoing::Image(path) => Some(load_media(MediaKind::Image, path).await?),
        Outgoing::Document(path) => Some(load_media(MediaKind::Document, path).await?),
        Outgoing::Audio(path) => Some(load_media(MediaKind::Audio, path).await?),
    };
    let media = media.map(|m| match &caption {
        Some(caption) => m.with_caption(caption.clone()),
        None => m,
    });
    match (&outgoing, &media) {
        (Outgoing::Text(text), _) => {
            parley_messaging::dispatch::validate_text(text)?;
        }
        (_, Some(media)) => session.policy().validate(media)?,
        (_, None) => {}
    }

    let thread = session.start(address, &InstanceId::from(instance)).await?;
    debug!(conversation = %thread.conversation.id, "sending");

    let message = match (outgoing, media) {
        (Outgoing::Text(text), _) => session.send_text(&text).await?,
        (_, Some(media)) => session.send_media(media).await?,
        (_, None) => {
            return Err(ParleyError::Internal("media payload missing".into()));
        }
    };
    println!(
        "  sent {} to +{} via {} ({})",
        message.kind,
        thread.conversation.counterparty_address,
        instance_label(&thread.instances, &thread.conversation.channel_instance_id),
        message.id
    );
    Ok(())
}

/// Run `parley watch`: prints new messages and status changes until Ctrl-C.
pub async fn run_watch(
    session: &MessagingSession,
    address: &str,
    instance: Option<&str>,
    use_color: bool,
) -> Result<(), ParleyError> {
    let requested = instance.map(InstanceId::from);
    let thread = session.open(address, requested.as_ref()).await?;
    println!();
    print_thread_header(&thread, session, use_color);

    let mut snapshots = session.sync().subscribe();
    let mut notices = session.sync().subscribe_notices();
    let handle = session.spawn_sync().await;
    let mut seen: HashMap<MessageId, DeliveryStatus> = HashMap::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let Some(snapshot) = snapshot else { continue };
                for message in &snapshot.messages {
                    if seen.get(&message.id) != Some(&message.status) {
                        println!("{}", render_message(message, use_color));
                        seen.insert(message.id.clone(), message.status);
                    }
                }
            }
            changed = notices.changed() => {
                if changed.is_err() {
                    break;
                }
                let notice = notices.borrow_and_update().clone();
                if let Some(notice) = notice {
                    eprintln!("{}", render_notice(&notice, use_color));
                }
            }
        }
    }

    session.shutdown();
    handle
        .await
        .map_err(|e| ParleyError::Internal(format!("sync task failed: {e}")))?;
    Ok(())
}

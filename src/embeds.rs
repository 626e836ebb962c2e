use serenity::all::{ButtonStyle, Colour, CreateActionRow, CreateButton, CreateEmbed};

use crate::error::{MusicError, ResolutionError, SinkError};
use crate::music::{format_duration, QueueSnapshot, TrackSummary};

pub const QUEUE_PAGE_SIZE: usize = 5;
const QUEUE_BUTTON_PREFIX: &str = "queue";
// Discord rejects empty field values.
const BLANK: &str = "\u{200b}";

pub fn notice(title: &str, description: impl Into<String>, colour: Colour) -> CreateEmbed {
    CreateEmbed::new()
        .title(title)
        .description(description)
        .colour(colour)
}

pub fn error(title: &str, description: impl Into<String>) -> CreateEmbed {
    notice(title, description, Colour::RED)
}

pub fn now_playing(track: &TrackSummary) -> CreateEmbed {
    track_embed("Now Playing", track, Colour::DARK_GREEN)
}

pub fn added_to_queue(track: &TrackSummary, position: usize) -> CreateEmbed {
    track_embed("Added to Queue", track, Colour::BLUE).field("Position", format!("#{position}"), true)
}

pub fn skipped(track: &TrackSummary) -> CreateEmbed {
    notice(
        "Skipped",
        format!("Skipped **{}**.", track.title),
        Colour::ORANGE,
    )
}

pub fn left() -> CreateEmbed {
    notice("Jeng has ran away.", "Left the voice channel.", Colour::PURPLE)
}

pub fn auto_disconnected() -> CreateEmbed {
    notice(
        "Jeng has ran away.",
        "No music playing, disconnected automatically.",
        Colour::PURPLE,
    )
}

pub fn connection_lost() -> CreateEmbed {
    notice(
        "Disconnected",
        "I lost my voice connection, so the queue was cleared.",
        Colour::PURPLE,
    )
}

pub fn playback_failed(track: &TrackSummary, reason: &str) -> CreateEmbed {
    error(
        "Playback Failed",
        format!("Couldn't play **{}**: {reason}", track.title),
    )
}

pub fn play_failed(err: &MusicError) -> CreateEmbed {
    match err {
        MusicError::Resolution(ResolutionError::AuthRequired(_)) => error(
            "Couldn't Load Track",
            "The source wants me to sign in. Ask the bot owner to refresh the yt-dlp cookies.",
        ),
        MusicError::Resolution(ResolutionError::NotFound(_)) => {
            error("Track Not Found", "There is nothing playable at that URL.")
        }
        MusicError::Resolution(ResolutionError::InvalidUrl(_)) => {
            error("Invalid URL", "That doesn't look like a link I can play.")
        }
        MusicError::Resolution(ResolutionError::TransientNetwork(_)) => error(
            "Couldn't Load Track",
            "Network trouble while loading that track. Try again in a moment.",
        ),
        MusicError::Sink(SinkError::Connect(_)) => error(
            "Can't Join",
            "I couldn't join your voice channel. Check my permissions.",
        ),
        MusicError::QueueFull(limit) => error(
            "Queue Full",
            format!("The queue already holds {limit} songs."),
        ),
        MusicError::Superseded => error("Cancelled", "The player was stopped before that track loaded."),
        other => error("Playback Error", other.to_string()),
    }
}

fn track_embed(title: &str, track: &TrackSummary, colour: Colour) -> CreateEmbed {
    let mut embed = notice(title, track.title.clone(), colour).url(&track.source_url);

    if let Some(duration) = track.duration {
        embed = embed.field("Duration", format_duration(duration), true);
    }
    if let Some(thumbnail) = &track.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed
}

const MUSIC_COMMANDS: &[(&str, &str)] = &[
    ("/play <url>", "Plays a song from the given URL."),
    ("/queue", "Shows the current music queue."),
    ("/skip", "Skips the current song."),
    ("/stop", "Pauses the music."),
    ("/start", "Resumes paused music."),
    (
        "/leave",
        "Clears the queue and makes the bot leave the voice channel.",
    ),
];

pub fn help() -> CreateEmbed {
    MUSIC_COMMANDS.iter().fold(
        CreateEmbed::new()
            .title("🎵 Music Commands")
            .colour(Colour::BLUE),
        |embed, (name, usage)| embed.field(*name, *usage, false),
    )
}

pub fn page_count(queued: usize) -> usize {
    queued.div_ceil(QUEUE_PAGE_SIZE).max(1)
}

/// Renders one page of the queue plus its navigation buttons.
///
/// `page` is clamped, so a button pressed after the queue shrank still lands
/// on a real page.
pub fn queue_view(snapshot: &QueueSnapshot, page: usize) -> (CreateEmbed, Vec<CreateActionRow>) {
    if snapshot.upcoming.is_empty() {
        let embed = match &snapshot.now_playing {
            Some(current) => notice(
                "Queue Empty",
                format!("Now playing **{}**. Nothing else is queued.", current.title),
                Colour::BLUE,
            ),
            None => error("Queue Empty", "No songs in queue."),
        };
        return (embed, Vec::new());
    }

    let pages = page_count(snapshot.upcoming.len());
    let page = page.min(pages - 1);
    let start = page * QUEUE_PAGE_SIZE;

    let mut embed = CreateEmbed::new()
        .title(format!("🎶 Current Queue (Page {}/{})", page + 1, pages))
        .colour(Colour::BLUE);

    if let Some(current) = &snapshot.now_playing {
        let state = if snapshot.paused { " (paused)" } else { "" };
        embed = embed.description(format!("Now playing: **{}**{state}", current.title));
    }

    for (index, track) in snapshot
        .upcoming
        .iter()
        .enumerate()
        .skip(start)
        .take(QUEUE_PAGE_SIZE)
    {
        let length = track
            .duration
            .map(format_duration)
            .unwrap_or_else(|| BLANK.to_string());
        embed = embed.field(format!("{}. {}", index + 1, track.title), length, false);
    }

    if let Some(thumbnail) = &snapshot.upcoming[start].thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    let buttons = vec![
        CreateButton::new(queue_button_id("prev", page.saturating_sub(1)))
            .label("⬅️")
            .style(ButtonStyle::Primary)
            .disabled(page == 0),
        CreateButton::new(queue_button_id("next", (page + 1).min(pages - 1)))
            .label("➡️")
            .style(ButtonStyle::Primary)
            .disabled(page + 1 >= pages),
    ];

    (embed, vec![CreateActionRow::Buttons(buttons)])
}

fn queue_button_id(direction: &str, target: usize) -> String {
    format!("{QUEUE_BUTTON_PREFIX}:{direction}:{target}")
}

/// Extracts the target page from a queue navigation button id.
pub fn parse_queue_button(custom_id: &str) -> Option<usize> {
    let mut parts = custom_id.split(':');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(QUEUE_BUTTON_PREFIX), Some("prev" | "next"), Some(page), None) => page.parse().ok(),
        _ => None,
    }
}

use serenity::all::{
    ChannelId, Colour, CommandInteraction, CommandOptionType, ComponentInteraction, Context,
    CreateCommand, CreateCommandOption, CreateEmbed, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditInteractionResponse, GuildId, UserId,
};
use tracing::{info, warn};

use crate::embeds;
use crate::error::MusicError;
use crate::events::Handler;
use crate::music::{PlayOutcome, PlayRequest};

pub fn definitions() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("play")
            .description("Plays a song from a YouTube URL")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "url", "YouTube URL")
                    .required(true),
            ),
        CreateCommand::new("queue").description("Shows the current music queue"),
        CreateCommand::new("skip").description("Skips the current song"),
        CreateCommand::new("stop").description("Pauses the music"),
        CreateCommand::new("start").description("Resumes paused music"),
        CreateCommand::new("leave").description("Disconnects from voice and clears the queue"),
        CreateCommand::new("help").description("Lists the music commands"),
    ]
}

pub async fn run(ctx: &Context, handler: &Handler, command: &CommandInteraction) {
    let inputs: Vec<String> = command
        .data
        .options
        .iter()
        .map(|option| format!("{}={:?}", option.name, option.value))
        .collect();
    info!(
        command = %command.data.name,
        user = %command.user.name,
        guild_id = ?command.guild_id,
        ?inputs,
        "Command triggered"
    );

    if command.data.name == "help" {
        respond(ctx, command, embeds::help()).await;
        return;
    }

    let Some(guild_id) = command.guild_id else {
        respond(
            ctx,
            command,
            embeds::error("Server Only", "Music commands only work inside a server."),
        )
        .await;
        return;
    };

    let player = &handler.player;
    let embed = match command.data.name.as_str() {
        "play" => return play(ctx, handler, command, guild_id).await,
        "queue" => return show_queue(ctx, handler, command, guild_id).await,
        "skip" => match player.skip(guild_id).await {
            Ok(track) => embeds::skipped(&track),
            Err(MusicError::Sink(why)) => embeds::error("Playback Error", why.to_string()),
            Err(_) => embeds::error("No Song Playing", "Nothing to skip."),
        },
        "stop" => match player.pause(guild_id).await {
            Ok(()) => embeds::notice("Paused", "Music paused.", Colour::ORANGE),
            Err(MusicError::Sink(why)) => embeds::error("Playback Error", why.to_string()),
            Err(_) => embeds::error("No Music Playing", "Nothing to pause."),
        },
        "start" => match player.resume(guild_id).await {
            Ok(()) => embeds::notice("Resumed", "Music resumed.", Colour::DARK_GREEN),
            Err(MusicError::Sink(why)) => embeds::error("Playback Error", why.to_string()),
            Err(_) => embeds::error("Not Paused", "Nothing is paused."),
        },
        "leave" => {
            if player.leave(guild_id).await {
                embeds::left()
            } else {
                embeds::error("Not Connected", "I'm not in a voice channel.")
            }
        }
        other => {
            warn!("Unknown command: {other}");
            embeds::error("Unknown Command", "i donbt know dis command uwu :(")
        }
    };

    respond(ctx, command, embed).await;
}

async fn play(ctx: &Context, handler: &Handler, command: &CommandInteraction, guild_id: GuildId) {
    let url = command
        .data
        .options
        .iter()
        .find(|option| option.name == "url")
        .and_then(|option| option.value.as_str())
        .map(str::to_owned);
    let Some(url) = url else {
        respond(ctx, command, embeds::error("Missing URL", "Give me a link to play.")).await;
        return;
    };

    let Some(destination) = voice_channel_of(ctx, guild_id, command.user.id) else {
        respond(
            ctx,
            command,
            embeds::error("Not In Voice", "Join a voice channel first."),
        )
        .await;
        return;
    };

    // Resolving can take longer than the three seconds Discord allows.
    if let Err(why) = command.defer(&ctx.http).await {
        warn!("Cannot defer slash command: {why}");
        return;
    }

    handler.announcer.remember(guild_id, command.channel_id);

    let request = PlayRequest {
        guild_id,
        url,
        destination,
    };
    let embed = match handler.player.play(request).await {
        Ok(PlayOutcome::NowPlaying(track)) => embeds::now_playing(&track),
        Ok(PlayOutcome::Queued { track, position }) => embeds::added_to_queue(&track, position),
        Err(why) => {
            warn!(%guild_id, "Play failed: {why}");
            embeds::play_failed(&why)
        }
    };

    let response = EditInteractionResponse::new().embed(embed);
    if let Err(why) = command.edit_response(&ctx.http, response).await {
        warn!("Cannot edit slash command response: {why}");
    }
}

async fn show_queue(
    ctx: &Context,
    handler: &Handler,
    command: &CommandInteraction,
    guild_id: GuildId,
) {
    let snapshot = handler.player.queue(guild_id).await;
    let (embed, components) = embeds::queue_view(&snapshot, 0);
    let message = CreateInteractionResponseMessage::new()
        .embed(embed)
        .components(components);

    if let Err(why) = command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await
    {
        warn!("Cannot respond to slash command: {why}");
    }
}

/// Handles the queue's page buttons by redrawing the message in place.
pub async fn page_queue(ctx: &Context, handler: &Handler, component: &ComponentInteraction) {
    let Some(page) = embeds::parse_queue_button(&component.data.custom_id) else {
        warn!("Unknown component: {}", component.data.custom_id);
        return;
    };
    let Some(guild_id) = component.guild_id else {
        return;
    };

    let snapshot = handler.player.queue(guild_id).await;
    let (embed, components) = embeds::queue_view(&snapshot, page);
    let message = CreateInteractionResponseMessage::new()
        .embed(embed)
        .components(components);

    if let Err(why) = component
        .create_response(&ctx.http, CreateInteractionResponse::UpdateMessage(message))
        .await
    {
        warn!("Cannot update queue message: {why}");
    }
}

fn voice_channel_of(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = match ctx.cache.guild(guild_id) {
        Some(guild) => guild,
        None => {
            warn!("Cannot find guild in cache: {}", guild_id);
            return None;
        }
    };

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) {
    let message = CreateInteractionResponseMessage::new().embed(embed);

    if let Err(why) = command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await
    {
        warn!("Cannot respond to slash command: {why}");
    }
}

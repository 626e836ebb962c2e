use std::sync::Arc;

use serenity::all::{ActivityData, Command, Context, EventHandler, Interaction, Ready};
use serenity::async_trait;
use tracing::{debug, info, warn};

use crate::announcer::Announcer;
use crate::commands;
use crate::music::PlayerManager;

pub struct Handler {
    pub player: Arc<PlayerManager>,
    pub announcer: Arc<Announcer>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => commands::run(&ctx, self, &command).await,
            Interaction::Component(component) => {
                commands::page_queue(&ctx, self, &component).await
            }
            _ => {}
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);
        for guild in &ready.guilds {
            debug!(guild_id = %guild.id, "Guild available");
        }

        ctx.set_activity(Some(ActivityData::listening("/help")));

        match Command::set_global_commands(&ctx.http, commands::definitions()).await {
            Ok(registered) => info!("Registered {} slash commands", registered.len()),
            Err(why) => warn!("Cannot register slash commands: {why}"),
        }
    }
}

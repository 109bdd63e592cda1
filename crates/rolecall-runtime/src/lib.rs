//! Discord runtime for rolecall: reconciles declared announcement messages
//! against live channel state and toggles roles from reaction and button
//! selection events.

mod discord_helpers;
pub mod discord_runtime;

pub use discord_runtime::{
    run_discord_runtime, DiscordRuntime, DiscordRuntimeConfig, ReconcileReport,
};

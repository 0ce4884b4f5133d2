pub mod notify;
pub use notify::{DiscordNotifier, EventBusNotifier, FanoutNotifier};

pub mod watcher;
pub use watcher::{
    OwnerDirectory, SearchProvider, SweepConfig, SweepError, SweepStats, WatchChange,
    WatchNotifier, WatchSweeper, WatchStore,
};

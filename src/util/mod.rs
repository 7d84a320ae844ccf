mod supervisor;
mod ticker;

pub(crate) use supervisor::join_supervised;
pub(crate) use supervisor::supervised;
pub(crate) use supervisor::TaskPanicked;
pub(crate) use ticker::spawn_ticker;
pub(crate) use ticker::TickerHandle;

pub mod broadcast;
pub mod gateway;

pub use broadcast::{
    BroadcastCommand, BroadcastMetricsSink, BroadcastPool, RingCache, BACKFILL_CATCHUP_TIMEOUT, MAX_BACKLOG_LEN,
    MAX_CACHE_SIZE,
};
pub use gateway::{ActionMetricsSink, AuthenticatedTransport, ConnectionStats, Gateway, NetError};

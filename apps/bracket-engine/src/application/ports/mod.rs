//! Application Ports (Driven)
//!
//! Interfaces for the external collaborators the engine consumes: the broker
//! order stream, the broker REST API, market data, position listings, the
//! notification sink, and the pub-sub fan-out. Adapters live in
//! `infrastructure`; tests use hand-rolled mocks.

mod broker;
mod event_bus;
mod market_data;
mod notifier;
mod order_stream;
mod positions;

pub use broker::{BrokerAck, BrokerError, BrokerPort, OrderModify};
pub use event_bus::{EventBusPort, NoOpEventBus, PublishError};
pub use market_data::{MarketDataError, MarketDataPort, MarketTick};
pub use notifier::{NoOpNotifier, NotifierPort, NotifyError};
pub use order_stream::{ORDER_UPDATES_CHANNEL, OrderStreamPort, StreamError};
pub use positions::{PositionInfo, PositionsError, PositionsPort};
